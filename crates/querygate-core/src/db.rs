//! # Database Pools
//!
//! `DatabasePool` wraps one sqlx pool per supported backend. It is built once
//! per process, shared by reference, and handed to the introspector and the
//! executor. Every executor call checks out exactly one connection, which
//! returns to the pool when the call finishes or its future is dropped.

use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::error::{QueryGateError, Result};
use crate::schema::introspect::{database_type_from_url, SchemaIntrospector};
use crate::schema::mysql::MySqlIntrospector;
use crate::schema::postgres::PostgresIntrospector;
use crate::schema::sqlite::SqliteIntrospector;
use crate::schema::types::{DatabaseSchema, DatabaseType};

const DEFAULT_PG_SCHEMA: &str = "public";

#[derive(Debug, Clone)]
pub enum DatabasePool {
    Postgres { pool: PgPool, schema: String },
    MySql { pool: MySqlPool, database: String },
    Sqlite(SqlitePool),
}

impl DatabasePool {
    /// Open a pool for `db_url`, picking the backend from the URL scheme.
    pub async fn connect(db_url: &str, config: &DatabaseConfig) -> Result<Self> {
        let db_type = database_type_from_url(db_url)?;
        let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

        tracing::debug!(
            "Connecting to {} at {}",
            db_type,
            sanitize_url(db_url)
        );

        let pool = match db_type {
            DatabaseType::PostgreSQL => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(db_url)
                    .await
                    .map_err(|e| QueryGateError::Connection {
                        message: "Failed to connect to PostgreSQL".to_string(),
                        connection_hint: sanitize_url(db_url),
                        source: e,
                    })?;
                DatabasePool::Postgres {
                    pool,
                    schema: config
                        .schema
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PG_SCHEMA.to_string()),
                }
            }
            DatabaseType::MySQL => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(db_url)
                    .await
                    .map_err(|e| QueryGateError::Connection {
                        message: "Failed to connect to MySQL".to_string(),
                        connection_hint: sanitize_url(db_url),
                        source: e,
                    })?;
                let database = match &config.schema {
                    Some(schema) => schema.clone(),
                    None => mysql_database_name(db_url)?,
                };
                DatabasePool::MySql { pool, database }
            }
            DatabaseType::SQLite => {
                // An in-memory database exists per connection, so keep one.
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .connect(db_url)
                    .await
                    .map_err(|e| QueryGateError::Connection {
                        message: "Failed to open SQLite database".to_string(),
                        connection_hint: sanitize_url(db_url),
                        source: e,
                    })?;
                DatabasePool::Sqlite(pool)
            }
        };

        Ok(pool)
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::Postgres { .. } => DatabaseType::PostgreSQL,
            DatabasePool::MySql { .. } => DatabaseType::MySQL,
            DatabasePool::Sqlite(_) => DatabaseType::SQLite,
        }
    }

    /// Read table, column, key, and index metadata from the live database.
    pub async fn introspect(&self) -> Result<DatabaseSchema> {
        match self {
            DatabasePool::Postgres { pool, schema } => {
                PostgresIntrospector::with_schema(pool.clone(), schema.clone())
                    .introspect()
                    .await
            }
            DatabasePool::MySql { pool, database } => {
                MySqlIntrospector::new(pool.clone(), database.clone())
                    .introspect()
                    .await
            }
            DatabasePool::Sqlite(pool) => SqliteIntrospector::new(pool.clone()).introspect().await,
        }
    }

    /// Round-trip a trivial `SELECT 1` to confirm the database answers.
    pub async fn ping(&self) -> Result<()> {
        let result = match self {
            DatabasePool::Postgres { pool, .. } => {
                sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
            }
            DatabasePool::MySql { pool, .. } => {
                sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
            }
            DatabasePool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.map_err(|e| QueryGateError::Execution {
            sql_preview: "SELECT 1".to_string(),
            source: e,
        })
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::Postgres { pool, .. } => pool.close().await,
            DatabasePool::MySql { pool, .. } => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Sanitize a database URL for error messages (hide password).
pub fn sanitize_url(db_url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(db_url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("****"));
        }
        return parsed.to_string();
    }
    // SQLite paths and other non-URL strings pass through
    db_url.to_string()
}

/// The database a MySQL URL points at, taken from its first path segment.
fn mysql_database_name(db_url: &str) -> Result<String> {
    let parsed = url::Url::parse(db_url).map_err(|e| QueryGateError::Config {
        message: format!("Invalid MySQL URL {}: {}", sanitize_url(db_url), e),
    })?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .ok_or_else(|| QueryGateError::Config {
            message: format!(
                "MySQL URL {} does not name a database (expected mysql://host/<database>)",
                sanitize_url(db_url)
            ),
        })
}
