pub mod ask;
pub mod health;
pub mod schema;
pub mod sql;
pub mod validate;

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use comfy_table::Table as ComfyTable;
use indicatif::{ProgressBar, ProgressStyle};

use querygate_core::config::{read_config, QueryGateConfig};
use querygate_core::format::ResponseFormatter;
use querygate_core::output::csv::to_csv_string;
use querygate_core::{DatabasePool, QueryResponse, ResultSet};

use crate::args::{GlobalArgs, ResultFormat};

/// Widest cell shown in terminal tables.
const TABLE_CELL_CHARS: usize = 40;

/// Load querygate.toml from the working directory, or defaults.
pub fn load_config() -> Result<QueryGateConfig> {
    Ok(read_config(Path::new("."))?.unwrap_or_default())
}

/// Resolve the connection URL: --db, DATABASE_URL, .env, querygate.toml.
pub fn resolve_db_url(explicit: Option<&str>, config: &QueryGateConfig) -> Result<String> {
    if let Some(url) = explicit {
        return Ok(url.to_string());
    }

    if let Ok(url) = std::env::var("DATABASE_URL") {
        return Ok(url);
    }

    if dotenvy::dotenv().is_ok() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return Ok(url);
        }
    }

    if let Some(ref url) = config.database.url {
        return Ok(url.clone());
    }

    Err(querygate_core::QueryGateError::NoDatabaseUrl.into())
}

/// Connect using the resolved URL, with `--schema` overriding the config.
pub async fn connect(global: &GlobalArgs, config: &QueryGateConfig) -> Result<DatabasePool> {
    let db_url = resolve_db_url(global.db.as_deref(), config)?;
    let mut db_config = config.database.clone();
    if global.schema.is_some() {
        db_config.schema = global.schema.clone();
    }

    let pb = spinner("Connecting...");
    let pool = DatabasePool::connect(&db_url, &db_config).await;
    pb.finish_and_clear();
    Ok(pool?)
}

pub fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a pipeline outcome in the requested format. Failures become an
/// error so the process exits non-zero.
pub fn print_response(
    response: &QueryResponse,
    format: ResultFormat,
    formatter: &ResponseFormatter,
) -> Result<()> {
    if format == ResultFormat::Json {
        println!("{}", serde_json::to_string_pretty(response)?);
        if let Some(error) = response.error() {
            bail!("{}", error);
        }
        return Ok(());
    }

    let (sql, results, report) = match response {
        QueryResponse::Success {
            sql,
            response,
            results,
            ..
        } => (sql, results, response),
        QueryResponse::Failure { error, sql, .. } => {
            if let Some(sql) = sql {
                eprintln!("SQL: {}", sql);
            }
            if format == ResultFormat::Text {
                println!("{}", text_report(response, formatter));
            }
            bail!("{}", error);
        }
    };

    match format {
        ResultFormat::Text => println!("{}", report),
        ResultFormat::Csv => {
            let csv = to_csv_string(results)?;
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(csv.as_bytes())
                .context("Failed to write CSV to stdout")?;
        }
        ResultFormat::Table | ResultFormat::Json => {
            eprintln!("{}", sql);
            if results.is_empty() {
                println!("No results found for your query.");
            } else {
                println!("{}", render_table(results));
                let mut summary = format!("{} rows", results.row_count());
                if results.truncated {
                    summary.push_str(&format!(" (capped at {}; more may exist)", results.max_rows));
                }
                eprintln!("{}", summary);
            }
        }
    }
    Ok(())
}

/// What `--format text` prints: the formatted answer or the failure line.
fn text_report(response: &QueryResponse, formatter: &ResponseFormatter) -> String {
    match response {
        QueryResponse::Success { response, .. } => response.clone(),
        QueryResponse::Failure { error, .. } => formatter.format_failure(error),
    }
}

pub fn render_table(results: &ResultSet) -> ComfyTable {
    let mut t = ComfyTable::new();
    t.set_header(results.columns.iter().map(|c| c.as_str()).collect::<Vec<_>>());

    for row in &results.rows {
        let values: Vec<String> = results
            .columns
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|v| shorten(&v.to_string(), TABLE_CELL_CHARS))
                    .unwrap_or_else(|| "NULL".to_string())
            })
            .collect();
        t.add_row(values);
    }
    t
}

fn shorten(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
