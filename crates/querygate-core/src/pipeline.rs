//! # Query Pipeline
//!
//! `QueryService` drives one question through five stages:
//!
//! ```text
//! SchemaReady -> SqlGenerated -> SqlValidated -> Executed -> Formatted
//!       \              \              \              \
//!        `--------------`--------------`--------------`--> Failed
//! ```
//!
//! Validation is the only branch: an invalid verdict ends the run with the
//! rejection reason as the error text. There is no retry loop. Callers that
//! want to retry with a rephrased question do so around `ask`.
//!
//! The service is built once (pool, generator, limits) and shared by
//! reference across requests. It holds no per-request state; the optional
//! [`MetricsLog`] only accumulates finished runs.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::{QueryConfig, MAX_ROWS_CEILING};
use crate::db::DatabasePool;
use crate::error::{QueryGateError, Result};
use crate::execute::{execute, ResultSet};
use crate::format::ResponseFormatter;
use crate::metrics::{MetricsLog, MetricsSummary, RunMetrics, TokenUsage};
use crate::schema::describe::describe_schema;
use crate::schema::types::DatabaseType;
use crate::validate::{SqlValidator, Verdict};

/// Pipeline position. `Failed` is reachable from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SchemaReady,
    SqlGenerated,
    SqlValidated,
    Executed,
    Formatted,
    Failed,
}

impl Stage {
    /// Progress text shown while the stage's work is running.
    pub fn progress_message(&self) -> &'static str {
        match self {
            Stage::SchemaReady => "Analyzing database schema...",
            Stage::SqlGenerated => "Generating SQL query...",
            Stage::SqlValidated => "Validating SQL query...",
            Stage::Executed => "Executing SQL query...",
            Stage::Formatted => "Formatting response...",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SchemaReady => "schema_ready",
            Stage::SqlGenerated => "sql_generated",
            Stage::SqlValidated => "sql_validated",
            Stage::Executed => "executed",
            Stage::Formatted => "formatted",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One turn of prior conversation. Accepted for API compatibility; the
/// pipeline does not read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Inbound request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Per-request override of the row cap, clamped like the configured one.
    #[serde(default)]
    pub row_limit: Option<usize>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_row_limit(mut self, rows: usize) -> Self {
        self.row_limit = Some(rows);
        self
    }
}

/// Row caps for one run.
///
/// `max_rows` is clamped to `1..=10000`, and `default_limit` never exceeds it,
/// so an injected LIMIT can't ask for more rows than the executor keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryLimits {
    pub default_limit: usize,
    pub max_rows: usize,
}

impl QueryLimits {
    pub fn new(default_limit: usize, max_rows: usize) -> Self {
        let max_rows = max_rows.clamp(1, MAX_ROWS_CEILING);
        Self {
            default_limit: default_limit.clamp(1, max_rows),
            max_rows,
        }
    }

    pub fn with_max_rows(self, max_rows: usize) -> Self {
        Self::new(self.default_limit, max_rows)
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

/// What the generator gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub question: &'a str,
    pub schema_text: &'a str,
    pub dialect: DatabaseType,
    pub default_limit: usize,
}

/// SQL text from a generator, plus what producing it cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    pub usage: TokenUsage,
}

impl GeneratedSql {
    pub fn new(sql: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            sql: sql.into(),
            usage,
        }
    }
}

impl From<String> for GeneratedSql {
    fn from(sql: String) -> Self {
        Self::new(sql, TokenUsage::default())
    }
}

/// Turns a question into SQL text. The text is untrusted: it always goes
/// through the validator before reaching the database.
pub trait SqlGenerator: Send + Sync {
    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> impl Future<Output = Result<GeneratedSql>> + Send;
}

/// Generator for services that only run hand-written SQL. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGenerator;

impl SqlGenerator for NoGenerator {
    async fn generate(&self, _ctx: &GenerationContext<'_>) -> Result<GeneratedSql> {
        Err(QueryGateError::Generation {
            message: "no SQL generator is configured".to_string(),
        })
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub enum QueryResponse {
    Success {
        sql: String,
        response: String,
        results: ResultSet,
        metrics: RunMetrics,
    },
    Failure {
        error: String,
        /// The stage that could not be reached.
        stage: Stage,
        /// SQL text, when generation got that far.
        sql: Option<String>,
        metrics: RunMetrics,
    },
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResponse::Success { .. })
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            QueryResponse::Success { sql, .. } => Some(sql),
            QueryResponse::Failure { sql, .. } => sql.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryResponse::Success { .. } => None,
            QueryResponse::Failure { error, .. } => Some(error),
        }
    }

    pub fn results(&self) -> Option<&ResultSet> {
        match self {
            QueryResponse::Success { results, .. } => Some(results),
            QueryResponse::Failure { .. } => None,
        }
    }

    pub fn metrics(&self) -> &RunMetrics {
        match self {
            QueryResponse::Success { metrics, .. } | QueryResponse::Failure { metrics, .. } => {
                metrics
            }
        }
    }
}

impl Serialize for QueryResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            QueryResponse::Success {
                sql,
                response,
                results,
                metrics,
            } => {
                let mut s = serializer.serialize_struct("QueryResponse", 7)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("sql", sql)?;
                s.serialize_field("response", response)?;
                s.serialize_field("results", &results.rows)?;
                s.serialize_field("row_count", &results.row_count())?;
                s.serialize_field("truncated", &results.truncated)?;
                s.serialize_field("metrics", metrics)?;
                s.end()
            }
            QueryResponse::Failure { error, metrics, .. } => {
                let mut s = serializer.serialize_struct("QueryResponse", 3)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.serialize_field("metrics", metrics)?;
                s.end()
            }
        }
    }
}

/// Connectivity and active limits, for the `health` command.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub backend: DatabaseType,
    pub max_rows: usize,
    pub default_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct QueryService<G> {
    pool: DatabasePool,
    generator: G,
    limits: QueryLimits,
    formatter: ResponseFormatter,
    timeout: Option<Duration>,
    metrics: Option<MetricsLog>,
}

/// A run that reached `Formatted`.
struct Answered {
    sql: String,
    response: String,
    results: ResultSet,
}

/// A run that stopped at `stage`.
struct Stopped {
    stage: Stage,
    sql: Option<String>,
    error: String,
}

impl<G: SqlGenerator> QueryService<G> {
    pub fn new(pool: DatabasePool, generator: G) -> Self {
        Self {
            pool,
            generator,
            limits: QueryLimits::default(),
            formatter: ResponseFormatter::default(),
            timeout: None,
            metrics: None,
        }
    }

    /// Build a service with limits, formatting, and timeout from `[query]`.
    pub fn from_config(pool: DatabasePool, generator: G, config: &QueryConfig) -> Self {
        Self::new(pool, generator)
            .with_limits(QueryLimits::new(config.default_limit, config.max_rows))
            .with_formatter(ResponseFormatter::new(
                config.preview_rows,
                config.max_cell_chars,
            ))
            .with_timeout((config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_formatter(mut self, formatter: ResponseFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep a [`MetricsLog`] of finished runs.
    pub fn with_metrics_log(mut self) -> Self {
        self.metrics = Some(MetricsLog::new());
        self
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    pub fn formatter(&self) -> &ResponseFormatter {
        &self.formatter
    }

    /// Summary of logged runs; `None` without a log or before the first run.
    pub fn metrics_summary(&self) -> Option<MetricsSummary> {
        self.metrics.as_ref().and_then(MetricsLog::summary)
    }

    pub fn clear_metrics(&self) {
        if let Some(log) = &self.metrics {
            log.clear();
        }
    }

    fn limits_for(&self, row_limit: Option<usize>) -> QueryLimits {
        match row_limit {
            Some(rows) => self.limits.with_max_rows(rows),
            None => self.limits,
        }
    }

    /// Validate SQL with the service's default limit. Does not touch the database.
    pub fn validate(&self, sql: &str) -> Verdict {
        SqlValidator::new(self.limits.default_limit).validate(sql)
    }

    /// Schema text as the generator sees it.
    pub async fn describe(&self) -> Result<String> {
        let schema = self.pool.introspect().await?;
        Ok(describe_schema(&schema))
    }

    pub async fn health(&self) -> HealthReport {
        let ping = self.pool.ping().await;
        HealthReport {
            status: if ping.is_ok() { "healthy" } else { "unhealthy" },
            database: if ping.is_ok() {
                "connected"
            } else {
                "unreachable"
            },
            backend: self.pool.database_type(),
            max_rows: self.limits.max_rows,
            default_limit: self.limits.default_limit,
            error: ping.err().map(|e| e.to_string()),
        }
    }

    pub async fn ask(&self, request: &QueryRequest) -> QueryResponse {
        self.ask_with_progress(request, |_| {}).await
    }

    /// Run the full pipeline, reporting each stage before its work starts
    /// and `Failed` if the run stops early.
    pub async fn ask_with_progress<F>(&self, request: &QueryRequest, mut on_stage: F) -> QueryResponse
    where
        F: FnMut(Stage) + Send,
    {
        let started = Instant::now();
        let limits = self.limits_for(request.row_limit);
        tracing::debug!(
            "Question: {:?} (default limit {}, max rows {})",
            request.question,
            limits.default_limit,
            limits.max_rows
        );

        let mut usage = TokenUsage::default();
        let outcome = self.answer(request, limits, &mut usage, &mut on_stage).await;
        if outcome.is_ok() {
            tracing::info!("Question answered in {:.1?}", started.elapsed());
        }
        self.finish(&request.question, started, usage, outcome)
    }

    /// Validate, execute, and format hand-written SQL. Skips generation.
    pub async fn run_sql(&self, sql: &str, row_limit: Option<usize>) -> QueryResponse {
        let started = Instant::now();
        let limits = self.limits_for(row_limit);
        let outcome = self
            .validate_and_run(sql.to_string(), limits, &mut |_: Stage| {})
            .await;
        self.finish(sql, started, TokenUsage::default(), outcome)
    }

    async fn answer<F>(
        &self,
        request: &QueryRequest,
        limits: QueryLimits,
        usage: &mut TokenUsage,
        on_stage: &mut F,
    ) -> std::result::Result<Answered, Stopped>
    where
        F: FnMut(Stage) + Send,
    {
        on_stage(Stage::SchemaReady);
        let schema = self
            .pool
            .introspect()
            .await
            .map_err(|e| stop(on_stage, Stage::SchemaReady, None, e.to_string()))?;
        let schema_text = describe_schema(&schema);
        tracing::debug!("Schema ready: {} tables", schema.table_count());

        on_stage(Stage::SqlGenerated);
        let ctx = GenerationContext {
            question: &request.question,
            schema_text: &schema_text,
            dialect: self.pool.database_type(),
            default_limit: limits.default_limit,
        };
        let generated = self
            .generator
            .generate(&ctx)
            .await
            .map_err(|e| stop(on_stage, Stage::SqlGenerated, None, e.to_string()))?;
        *usage += generated.usage;
        tracing::debug!(
            "Generated SQL ({} tokens): {}",
            generated.usage.total_tokens,
            generated.sql
        );

        self.validate_and_run(generated.sql, limits, on_stage).await
    }

    async fn validate_and_run<F>(
        &self,
        sql: String,
        limits: QueryLimits,
        on_stage: &mut F,
    ) -> std::result::Result<Answered, Stopped>
    where
        F: FnMut(Stage) + Send,
    {
        on_stage(Stage::SqlValidated);
        let validated = match SqlValidator::new(limits.default_limit).validate(&sql) {
            Verdict::Valid(validated) => validated,
            Verdict::Invalid(rejection) => {
                tracing::warn!("SQL rejected: {}", rejection);
                let reason = rejection.reason().to_string();
                return Err(stop(on_stage, Stage::SqlValidated, Some(sql), reason));
            }
        };
        if validated.limit_injected() {
            tracing::debug!("Added LIMIT {} to query", limits.default_limit);
        }

        on_stage(Stage::Executed);
        let run = execute(&self.pool, &validated, limits.max_rows);
        let executed = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => Err(QueryGateError::Timeout { limit }),
            },
            None => run.await,
        };
        let results = match executed {
            Ok(results) => results,
            Err(e) => {
                let error = e.to_string();
                return Err(stop(on_stage, Stage::Executed, Some(validated.into_string()), error));
            }
        };

        on_stage(Stage::Formatted);
        let response = self.formatter.format(&results, validated.as_str());
        Ok(Answered {
            sql: validated.into_string(),
            response,
            results,
        })
    }

    /// Attach run metrics, and log them when the service keeps a log.
    fn finish(
        &self,
        question: &str,
        started: Instant,
        tokens: TokenUsage,
        outcome: std::result::Result<Answered, Stopped>,
    ) -> QueryResponse {
        let elapsed = started.elapsed();
        let response = match outcome {
            Ok(Answered {
                sql,
                response,
                results,
            }) => {
                let metrics = RunMetrics {
                    question: question.to_string(),
                    elapsed,
                    stage: Stage::Formatted,
                    success: true,
                    sql: Some(sql.clone()),
                    row_count: results.row_count(),
                    tokens,
                    error: None,
                };
                QueryResponse::Success {
                    sql,
                    response,
                    results,
                    metrics,
                }
            }
            Err(Stopped { stage, sql, error }) => {
                let metrics = RunMetrics {
                    question: question.to_string(),
                    elapsed,
                    stage,
                    success: false,
                    sql: sql.clone(),
                    row_count: 0,
                    tokens,
                    error: Some(error.clone()),
                };
                QueryResponse::Failure {
                    error,
                    stage,
                    sql,
                    metrics,
                }
            }
        };

        if let Some(log) = &self.metrics {
            log.record(response.metrics().clone());
        }
        response
    }
}

fn stop<F: FnMut(Stage)>(on_stage: &mut F, stage: Stage, sql: Option<String>, error: String) -> Stopped {
    tracing::warn!("Pipeline failed at {}: {}", stage, error);
    on_stage(Stage::Failed);
    Stopped { stage, sql, error }
}
