use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "querygate",
    about = "Ask a database questions in plain language, with read-only SQL gating",
    version,
    after_help = "Examples:\n  querygate ask --db postgres://localhost/shop \"top 5 customers by revenue\"\n  querygate ask \"orders per month in 2024\" --format csv > orders.csv\n  querygate sql \"SELECT status, COUNT(*) FROM orders GROUP BY status\"\n  querygate validate \"DELETE FROM users\"\n  querygate schema --format text\n  querygate health"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Database connection URL (postgres://, mysql://, sqlite://)
    /// Falls back to DATABASE_URL env var, .env file, or querygate.toml
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub db: Option<String>,

    /// Schema to introspect (PostgreSQL schema or MySQL database)
    #[arg(long, global = true)]
    pub schema: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Turn a question into SQL, check it, run it, and show the answer
    Ask(AskArgs),

    /// Check and run hand-written SQL (no LLM)
    Sql(SqlArgs),

    /// Check SQL against the read-only rules without touching the database
    Validate(ValidateArgs),

    /// Show the introspected schema
    Schema(SchemaArgs),

    /// Report database connectivity and active row limits
    Health,
}

#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The question, in plain language
    pub question: String,

    /// Maximum rows to fetch (clamped to 1..=10000)
    #[arg(long)]
    pub rows: Option<usize>,

    /// Emit server-sent-event frames as the pipeline runs
    #[arg(long)]
    pub stream: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: ResultFormat,

    /// LLM model (or Azure deployment) to use
    #[arg(long)]
    pub model: Option<String>,

    /// Print a run metrics summary (timing, tokens) to stderr
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Parser, Debug)]
pub struct SqlArgs {
    /// A single SELECT or WITH statement
    pub sql: String,

    /// Maximum rows to fetch (clamped to 1..=10000)
    #[arg(long)]
    pub rows: Option<usize>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: ResultFormat,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// SQL to check
    pub sql: String,

    /// LIMIT to add when the statement has none
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print the verdict as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Output format
    #[arg(long, default_value = "table")]
    pub format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultFormat {
    /// Terminal table of every fetched row
    Table,
    /// The markdown report
    Text,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaFormat {
    Table,
    /// The schema description handed to the LLM
    Text,
    Json,
}
