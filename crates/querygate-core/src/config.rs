//! # Configuration File Parser
//!
//! Reads and parses `querygate.toml`, the optional configuration file that
//! sets connection and query defaults without CLI flags. Supports:
//!
//! - `[database]`: connection URL, schema name, pool sizing
//! - `[query]`: row caps, preview size, execution timeout
//! - `[llm]`: provider and model for SQL generation
//!
//! Example `querygate.toml`:
//!
//! ```toml
//! [database]
//! url = "postgres://localhost/shop"
//! schema = "public"
//! max_connections = 5
//!
//! [query]
//! default_limit = 100
//! max_rows = 1000
//! timeout_secs = 60
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{QueryGateError, Result};

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "querygate.toml";

/// Upper bound for any row cap, whatever the caller asks for.
pub const MAX_ROWS_CEILING: usize = 10_000;

/// Top-level querygate.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryGateConfig {
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub llm: LlmConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "postgres://localhost/shop").
    pub url: Option<String>,
    /// Schema to introspect: PostgreSQL schema name or MySQL database.
    pub schema: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: None,
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

/// Row caps and rendering limits applied to every query.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// LIMIT appended to statements that have none.
    pub default_limit: usize,
    /// Hard cap on rows fetched from the database.
    pub max_rows: usize,
    /// Rows shown in the formatted preview table.
    pub preview_rows: usize,
    /// Longest cell text before it is cut with "...".
    pub max_cell_chars: usize,
    /// Wall-clock budget for execution in seconds. 0 disables the timeout.
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_rows: 1000,
            preview_rows: 20,
            max_cell_chars: 50,
            timeout_secs: 60,
        }
    }
}

/// SQL generator settings. Credentials always come from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "claude", "openai" or "azure". Auto-detected from env when unset.
    pub provider: Option<String>,
    pub model: Option<String>,
}

pub const KNOWN_PROVIDERS: &[&str] = &["claude", "openai", "azure"];

/// Read and parse a querygate.toml file from the given directory.
///
/// Returns `None` if the file doesn't exist (config is optional).
/// Returns an error if the file exists but can't be parsed or is invalid.
pub fn read_config(dir: &Path) -> Result<Option<QueryGateConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| QueryGateError::Config {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let config: QueryGateConfig = toml::from_str(&content).map_err(|e| QueryGateError::Config {
        message: format!("Failed to parse {}: {}", path.display(), e),
    })?;

    config.validate()?;

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(Some(config))
}

impl QueryGateConfig {
    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(config_error("database.max_connections must be at least 1"));
        }
        let q = &self.query;
        if q.default_limit == 0 {
            return Err(config_error("query.default_limit must be at least 1"));
        }
        if q.max_rows == 0 {
            return Err(config_error("query.max_rows must be at least 1"));
        }
        if q.preview_rows == 0 {
            return Err(config_error("query.preview_rows must be at least 1"));
        }
        if q.max_cell_chars < 4 {
            return Err(config_error(
                "query.max_cell_chars must be at least 4 to leave room for \"...\"",
            ));
        }
        if let Some(provider) = &self.llm.provider {
            if !KNOWN_PROVIDERS.contains(&provider.to_lowercase().as_str()) {
                return Err(config_error(&format!(
                    "llm.provider '{}' is not supported. Expected one of: {}",
                    provider,
                    KNOWN_PROVIDERS.join(", ")
                )));
            }
        }
        if q.max_rows > MAX_ROWS_CEILING {
            tracing::warn!(
                "query.max_rows = {} exceeds {}; it will be clamped",
                q.max_rows,
                MAX_ROWS_CEILING
            );
        }
        Ok(())
    }
}

fn config_error(message: &str) -> QueryGateError {
    QueryGateError::Config {
        message: message.to_string(),
    }
}
