use anyhow::{bail, Result};

use querygate_core::{SqlValidator, Verdict};

use super::load_config;
use crate::args::ValidateArgs;

/// Offline: never connects to a database.
pub fn run(args: &ValidateArgs) -> Result<()> {
    let limit = match args.limit {
        Some(limit) => limit,
        None => load_config()?.query.default_limit,
    };
    let verdict = SqlValidator::new(limit).validate(&args.sql);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else if let Verdict::Valid(sql) = &verdict {
        println!("✓ Valid{}", if sql.limit_injected() { " (LIMIT added)" } else { "" });
        println!("{}", sql);
    }

    match verdict {
        Verdict::Valid(_) => Ok(()),
        Verdict::Invalid(rejection) => bail!("{}", rejection),
    }
}
