//! # Error Types
//!
//! Defines `QueryGateError`, the unified error enum for every failure mode in
//! the QueryGate pipeline. A rejected SQL statement is *not* an error: the
//! validator returns a negative `Verdict` instead, and the pipeline turns its
//! reason into a failure payload verbatim.

use thiserror::Error;

/// All errors that can occur in QueryGate operations.
#[derive(Error, Debug)]
pub enum QueryGateError {
    #[error("Database connection failed: {message}\n  Connection string: {connection_hint}\n  Cause: {source}")]
    Connection {
        message: String,
        connection_hint: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Schema introspection failed on query '{query}': {source}")]
    Introspection {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("No database URL provided. QueryGate looks for a connection in this order:\n  1. --db flag\n  2. DATABASE_URL environment variable\n  3. .env file with DATABASE_URL\n  4. querygate.toml [database] section\n\nExample: querygate ask --db postgres://localhost/shop \"how many orders were placed last week?\"")]
    NoDatabaseUrl,

    #[error("Unsupported database scheme '{scheme}'. Supported: postgres://, mysql://, sqlite://")]
    UnsupportedDatabase { scheme: String },

    #[error("SQL generation failed: {message}")]
    Generation { message: String },

    #[error("Query execution failed: {source}\n  SQL: {sql_preview}")]
    Execution {
        sql_preview: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query execution failed: statement returned rows of differing shape; only one statement may run\n  SQL: {sql_preview}")]
    MixedResultShape { sql_preview: String },

    #[error("Column '{column}' has type {type_name}, which QueryGate cannot convert. Cast it to text in the query (e.g. CAST({column} AS TEXT))")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("Query exceeded the {limit:?} execution timeout")]
    Timeout { limit: std::time::Duration },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, QueryGateError>;
