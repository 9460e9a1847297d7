//! # Query Executor
//!
//! Runs a [`ValidatedSql`] against the pool and collects at most `max_rows`
//! rows. Rows are streamed from the driver and the stream is dropped as soon
//! as the cap is reached, so an unbounded query never materializes more than
//! the cap in memory.
//!
//! Each call checks out one pooled connection. The connection goes back to
//! the pool on every exit path, including when the caller drops the future on
//! timeout.

pub mod decode;

use std::time::Instant;

use futures_util::TryStreamExt;
use indexmap::IndexMap;
use serde::Serialize;
use sqlx::mysql::MySqlPool;
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use sqlx::{Column, Executor, Row as _, Statement};

use crate::db::DatabasePool;
use crate::error::{QueryGateError, Result};
use crate::validate::ValidatedSql;
use crate::value::Scalar;

/// One result row: column name to cell, in select-list order.
pub type Row = IndexMap<String, Scalar>;

/// Rows returned by one query, capped at `max_rows`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// True when the cap was reached; more rows may exist.
    pub truncated: bool,
    pub max_rows: usize,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Execute validated SQL and return at most `max_rows` rows.
///
/// A `max_rows` of zero is treated as one.
pub async fn execute(pool: &DatabasePool, sql: &ValidatedSql, max_rows: usize) -> Result<ResultSet> {
    let max_rows = max_rows.max(1);
    let started = Instant::now();
    tracing::debug!("Executing (max {} rows): {}", max_rows, sql);

    let result = match pool {
        DatabasePool::Postgres { pool, .. } => run_postgres(pool, sql.as_str(), max_rows).await?,
        DatabasePool::MySql { pool, .. } => run_mysql(pool, sql.as_str(), max_rows).await?,
        DatabasePool::Sqlite(pool) => run_sqlite(pool, sql.as_str(), max_rows).await?,
    };

    tracing::info!(
        "Query returned {} rows in {:.1?}{}",
        result.row_count(),
        started.elapsed(),
        if result.truncated { " (truncated)" } else { "" }
    );
    Ok(result)
}

/// Accumulates decoded rows until the cap is hit.
struct RowCollector {
    columns: Vec<String>,
    rows: Vec<Row>,
    max_rows: usize,
}

impl RowCollector {
    fn new(max_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            max_rows,
        }
    }

    fn wants_more(&self) -> bool {
        self.rows.len() < self.max_rows
    }

    /// Decode one row. Every row must have the shape of the first; a second
    /// statement chained after `;` (SQLite runs both) shows up as a mismatch.
    fn push<R: sqlx::Row>(
        &mut self,
        row: &R,
        sql: &str,
        decode: fn(&R, usize) -> Result<Scalar>,
    ) -> Result<()> {
        let columns = row.columns();
        if self.rows.is_empty() {
            self.columns = column_names(columns);
        } else if !same_shape(columns, &self.columns) {
            return Err(QueryGateError::MixedResultShape {
                sql_preview: truncate_sql(sql, 200),
            });
        }
        let mut out = Row::with_capacity(self.columns.len());
        for (idx, name) in self.columns.iter().enumerate() {
            // Duplicate names (e.g. two joined `id` columns) keep the last value
            out.insert(name.clone(), decode(row, idx)?);
        }
        self.rows.push(out);
        Ok(())
    }

    fn finish(self) -> ResultSet {
        ResultSet {
            truncated: self.rows.len() == self.max_rows,
            columns: self.columns,
            rows: self.rows,
            max_rows: self.max_rows,
        }
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

fn same_shape<C: Column>(columns: &[C], names: &[String]) -> bool {
    columns.len() == names.len() && columns.iter().zip(names).all(|(c, n)| c.name() == n)
}

fn execution_error(sql: &str, source: sqlx::Error) -> QueryGateError {
    QueryGateError::Execution {
        sql_preview: truncate_sql(sql, 200),
        source,
    }
}

/// Truncate a SQL string for error messages.
fn truncate_sql(sql: &str, max_chars: usize) -> String {
    match sql.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &sql[..cut]),
        None => sql.to_string(),
    }
}

async fn run_postgres(pool: &PgPool, sql: &str, max_rows: usize) -> Result<ResultSet> {
    let mut conn = pool.acquire().await.map_err(|e| execution_error(sql, e))?;
    let mut collector = RowCollector::new(max_rows);
    {
        let mut rows = sqlx::query(sql).fetch(&mut *conn);
        while collector.wants_more() {
            match rows.try_next().await.map_err(|e| execution_error(sql, e))? {
                Some(row) => collector.push(&row, sql, decode::postgres)?,
                None => break,
            }
        }
    }
    if collector.columns.is_empty() {
        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| execution_error(sql, e))?;
        collector.columns = column_names(statement.columns());
    }
    Ok(collector.finish())
}

async fn run_mysql(pool: &MySqlPool, sql: &str, max_rows: usize) -> Result<ResultSet> {
    let mut conn = pool.acquire().await.map_err(|e| execution_error(sql, e))?;
    let mut collector = RowCollector::new(max_rows);
    {
        let mut rows = sqlx::query(sql).fetch(&mut *conn);
        while collector.wants_more() {
            match rows.try_next().await.map_err(|e| execution_error(sql, e))? {
                Some(row) => collector.push(&row, sql, decode::mysql)?,
                None => break,
            }
        }
    }
    if collector.columns.is_empty() {
        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| execution_error(sql, e))?;
        collector.columns = column_names(statement.columns());
    }
    Ok(collector.finish())
}

async fn run_sqlite(pool: &SqlitePool, sql: &str, max_rows: usize) -> Result<ResultSet> {
    let mut conn = pool.acquire().await.map_err(|e| execution_error(sql, e))?;
    let mut collector = RowCollector::new(max_rows);
    {
        let mut rows = sqlx::query(sql).fetch(&mut *conn);
        while collector.wants_more() {
            match rows.try_next().await.map_err(|e| execution_error(sql, e))? {
                Some(row) => collector.push(&row, sql, decode::sqlite)?,
                None => break,
            }
        }
    }
    if collector.columns.is_empty() {
        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| execution_error(sql, e))?;
        collector.columns = column_names(statement.columns());
    }
    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{SqlValidator, Verdict};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool(setup: &[&str]) -> DatabasePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        for stmt in setup {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        DatabasePool::Sqlite(pool)
    }

    fn validated(sql: &str) -> ValidatedSql {
        match SqlValidator::new(1000).validate(sql) {
            Verdict::Valid(v) => v,
            Verdict::Invalid(r) => panic!("rejected: {}", r),
        }
    }

    #[tokio::test]
    async fn test_caps_rows_and_flags_truncation() {
        let pool = memory_pool(&[
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL)",
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 150) \
             INSERT INTO orders (id, total) SELECT i, i * 1.5 FROM n",
        ])
        .await;

        let result = execute(&pool, &validated("SELECT * FROM orders"), 100)
            .await
            .unwrap();
        assert_eq!(result.row_count(), 100);
        assert!(result.truncated);
        assert_eq!(result.max_rows, 100);
        assert_eq!(result.columns, vec!["id", "total"]);
    }

    #[tokio::test]
    async fn test_under_cap_is_not_truncated() {
        let pool = memory_pool(&[
            "CREATE TABLE t (id INTEGER)",
            "INSERT INTO t VALUES (1), (2), (3)",
        ])
        .await;
        let result = execute(&pool, &validated("SELECT id FROM t ORDER BY id"), 10)
            .await
            .unwrap();
        assert_eq!(result.row_count(), 3);
        assert!(!result.truncated);
        assert_eq!(result.rows[2]["id"], Scalar::Integer(3));
    }

    #[tokio::test]
    async fn test_exact_cap_counts_as_truncated() {
        let pool = memory_pool(&[
            "CREATE TABLE t (id INTEGER)",
            "INSERT INTO t VALUES (1), (2)",
        ])
        .await;
        let result = execute(&pool, &validated("SELECT id FROM t"), 2)
            .await
            .unwrap();
        assert_eq!(result.row_count(), 2);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_converts_sqlite_values() {
        let pool = memory_pool(&[
            "CREATE TABLE products (id INTEGER, name TEXT, price NUMERIC(10,2), active BOOLEAN, \
             added_at DATETIME, image BLOB, note TEXT)",
            "INSERT INTO products VALUES (1, 'Desk lamp', 24.5, 1, '2024-03-01 09:15:00', X'CAFE', NULL)",
        ])
        .await;

        let result = execute(&pool, &validated("SELECT * FROM products"), 10)
            .await
            .unwrap();
        let row = &result.rows[0];
        assert_eq!(row["id"], Scalar::Integer(1));
        assert_eq!(row["name"], Scalar::Text("Desk lamp".to_string()));
        assert_eq!(row["price"], Scalar::Float(24.5));
        assert_eq!(row["active"], Scalar::Boolean(true));
        assert_eq!(
            row["added_at"],
            Scalar::Timestamp("2024-03-01T09:15:00".to_string())
        );
        assert_eq!(row["image"], Scalar::Text("\\xcafe".to_string()));
        assert_eq!(row["note"], Scalar::Null);
    }

    #[tokio::test]
    async fn test_column_order_follows_select_list() {
        let pool = memory_pool(&["CREATE TABLE t (a INTEGER, b INTEGER, c INTEGER)",
            "INSERT INTO t VALUES (1, 2, 3)"])
        .await;
        let result = execute(&pool, &validated("SELECT c, a, b FROM t"), 10)
            .await
            .unwrap();
        let keys: Vec<&String> = result.rows[0].keys().collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let pool = memory_pool(&["CREATE TABLE t (id INTEGER, label TEXT)"]).await;
        let result = execute(&pool, &validated("SELECT id, label FROM t"), 10)
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(!result.truncated);
        assert_eq!(result.columns, vec!["id", "label"]);
    }

    #[tokio::test]
    async fn test_database_error_is_execution_error() {
        let pool = memory_pool(&[]).await;
        let err = execute(&pool, &validated("SELECT nope FROM missing_table"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryGateError::Execution { .. }));
        assert!(err.to_string().contains("missing_table"));
    }

    #[tokio::test]
    async fn test_chained_statement_with_other_columns_is_rejected() {
        let pool = memory_pool(&[
            "CREATE TABLE t (a INTEGER, b TEXT)",
            "INSERT INTO t VALUES (1, 'x'), (2, 'y')",
        ])
        .await;

        let err = execute(&pool, &validated("SELECT a, b FROM t; SELECT 1"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryGateError::MixedResultShape { .. }));
        assert!(err.to_string().contains("only one statement may run"));

        // Same width, different names
        let err = execute(&pool, &validated("SELECT a FROM t; SELECT 1"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryGateError::MixedResultShape { .. }));
    }

    #[test]
    fn test_truncate_sql_respects_char_boundaries() {
        assert_eq!(truncate_sql("SELECT 1", 200), "SELECT 1");
        assert_eq!(truncate_sql("SELECT 'héllo'", 10), "SELECT 'hé...");
    }
}
