use anyhow::Result;

use querygate_core::{NoGenerator, QueryService};

use super::{connect, load_config, print_response, spinner};
use crate::args::{GlobalArgs, SqlArgs};

pub async fn run(global: &GlobalArgs, args: &SqlArgs) -> Result<()> {
    let config = load_config()?;
    let pool = connect(global, &config).await?;
    let service = QueryService::from_config(pool, NoGenerator, &config.query);

    let pb = spinner("Executing SQL query...");
    let response = service.run_sql(&args.sql, args.rows).await;
    pb.finish_and_clear();

    service.pool().close().await;
    print_response(&response, args.format, service.formatter())
}
