use anyhow::{bail, Result};

use querygate_core::pipeline::{HealthReport, QueryLimits};
use querygate_core::schema::introspect::database_type_from_url;
use querygate_core::{NoGenerator, QueryService};

use super::{connect, load_config, resolve_db_url};
use crate::args::GlobalArgs;

pub async fn run(global: &GlobalArgs) -> Result<()> {
    let config = load_config()?;

    let report = match connect(global, &config).await {
        Ok(pool) => {
            let service = QueryService::from_config(pool, NoGenerator, &config.query);
            let report = service.health().await;
            service.pool().close().await;
            report
        }
        Err(err) => {
            // A refused connection still gets a report; a missing URL doesn't
            let db_url = resolve_db_url(global.db.as_deref(), &config)?;
            let limits = QueryLimits::new(config.query.default_limit, config.query.max_rows);
            HealthReport {
                status: "unhealthy",
                database: "unreachable",
                backend: database_type_from_url(&db_url)?,
                max_rows: limits.max_rows,
                default_limit: limits.default_limit,
                error: Some(format!("{:#}", err)),
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.error.is_some() {
        bail!("database is {}", report.database);
    }
    Ok(())
}
