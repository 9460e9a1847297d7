use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{Cli, Command};

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose {
        EnvFilter::new("querygate_core=debug,querygate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Command::Ask(args) => commands::ask::run(&cli.global, args).await,
        Command::Sql(args) => commands::sql::run(&cli.global, args).await,
        Command::Validate(args) => commands::validate::run(args),
        Command::Schema(args) => commands::schema::run(&cli.global, args).await,
        Command::Health => commands::health::run(&cli.global).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
