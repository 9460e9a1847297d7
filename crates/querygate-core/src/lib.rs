pub mod config;
pub mod db;
pub mod error;
pub mod execute;
pub mod format;
pub mod llm;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod schema;
pub mod stream;
pub mod validate;
pub mod value;

// Re-export key types for convenience
pub use db::DatabasePool;
pub use error::{QueryGateError, Result};
pub use execute::{ResultSet, Row};
pub use metrics::{MetricsSummary, RunMetrics, TokenUsage};
pub use pipeline::{
    GeneratedSql, NoGenerator, QueryRequest, QueryResponse, QueryService, SqlGenerator, Stage,
};
pub use schema::types::{DatabaseSchema, DatabaseType};
pub use validate::{SqlValidator, ValidatedSql, Verdict};
pub use value::Scalar;
