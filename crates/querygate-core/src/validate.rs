//! # SQL Validator
//!
//! Gates generated SQL before it reaches the database. The checks run in a
//! fixed order and the first failure wins:
//!
//! 1. empty input
//! 2. forbidden keywords (`INSERT`, `DROP`, ...) as standalone words
//! 3. statement kind: must start with `SELECT` or `WITH`
//! 4. dangerous patterns (statement chaining, comments, schema probing)
//! 5. row cap: append `LIMIT <default>` when no `LIMIT` is present
//!
//! This is keyword matching over the raw text, not SQL parsing. A keyword
//! inside a string literal (`WHERE note = 'please delete'`) is rejected, and
//! a sufficiently obfuscated statement can slip through. Treat it as a
//! best-effort gate in front of a read-only database role, not as a
//! guarantee.
//!
//! Passing SQL comes back as [`ValidatedSql`], which only this module can
//! construct. The executor accepts nothing else.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Keywords that reject a statement outright, checked in this order.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC",
];

static FORBIDDEN_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"(?i)\b{}\b", kw)).unwrap()))
        .collect()
});

static DANGEROUS_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("chained DROP statement", r"(?i);\s*DROP"),
        ("chained DELETE statement", r"(?i);\s*DELETE"),
        ("inline comment (--)", r"--"),
        ("block comment (/*)", r"/\*"),
        (
            "UNION ALL SELECT against information_schema",
            r"(?is)UNION\s+ALL\s+SELECT.*FROM\s+information_schema",
        ),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).unwrap()))
    .collect()
});

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").unwrap());

/// SQL that passed every check, possibly with a row cap appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql {
    sql: String,
    limit_injected: bool,
}

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// True when the validator appended the default `LIMIT`.
    pub fn limit_injected(&self) -> bool {
        self.limit_injected
    }

    pub fn into_string(self) -> String {
        self.sql
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Why a statement was refused. The reason is shown to callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    reason: String,
}

impl Rejection {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Outcome of validating one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(ValidatedSql),
    Invalid(Rejection),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid(_))
    }

    /// Rejection reason, or an empty string for a valid verdict.
    pub fn reason(&self) -> &str {
        match self {
            Verdict::Valid(_) => "",
            Verdict::Invalid(r) => r.reason(),
        }
    }

    pub fn sql(&self) -> Option<&ValidatedSql> {
        match self {
            Verdict::Valid(sql) => Some(sql),
            Verdict::Invalid(_) => None,
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Verdict", 3)?;
        s.serialize_field("valid", &self.is_valid())?;
        s.serialize_field("reason", self.reason())?;
        s.serialize_field("sql", &self.sql().map(ValidatedSql::as_str))?;
        s.end()
    }
}

/// Stateless statement gate configured with the row cap to inject.
#[derive(Debug, Clone, Copy)]
pub struct SqlValidator {
    default_limit: usize,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SqlValidator {
    pub fn new(default_limit: usize) -> Self {
        Self { default_limit }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn validate(&self, sql: &str) -> Verdict {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Verdict::Invalid(Rejection::new("No SQL query to validate"));
        }

        for (keyword, re) in FORBIDDEN_RES.iter() {
            if re.is_match(trimmed) {
                return Verdict::Invalid(Rejection::new(format!(
                    "Forbidden operation: {}",
                    keyword
                )));
            }
        }

        let upper = trimmed.to_uppercase();
        if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
            return Verdict::Invalid(Rejection::new(
                "Only read queries are allowed: statement must start with SELECT or WITH",
            ));
        }

        for (label, re) in DANGEROUS_RES.iter() {
            if re.is_match(trimmed) {
                return Verdict::Invalid(Rejection::new(format!(
                    "Dangerous pattern detected: {}",
                    label
                )));
            }
        }

        if LIMIT_RE.is_match(trimmed) {
            return Verdict::Valid(ValidatedSql {
                sql: sql.to_string(),
                limit_injected: false,
            });
        }

        Verdict::Valid(ValidatedSql {
            sql: self.inject_limit(trimmed),
            limit_injected: true,
        })
    }

    /// Append the row cap before the trailing semicolon, collapsing repeated
    /// semicolons to one. Input without a semicolon gets none.
    fn inject_limit(&self, sql: &str) -> String {
        let body = sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        let terminator = if body.len() < sql.len() && sql[body.len()..].contains(';') {
            ";"
        } else {
            ""
        };
        format!("{} LIMIT {}{}", body, self.default_limit, terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new(100)
    }

    fn valid_sql(sql: &str) -> String {
        match validator().validate(sql) {
            Verdict::Valid(v) => v.into_string(),
            Verdict::Invalid(r) => panic!("expected valid, got: {}", r),
        }
    }

    #[test]
    fn test_drop_is_rejected_citing_keyword() {
        let verdict = validator().validate("DROP TABLE users;");
        assert!(!verdict.is_valid());
        assert!(verdict.reason().contains("DROP"), "{}", verdict.reason());
    }

    #[test]
    fn test_missing_limit_is_appended() {
        assert_eq!(
            valid_sql("SELECT * FROM orders"),
            "SELECT * FROM orders LIMIT 100"
        );
    }

    #[test]
    fn test_inline_comment_is_rejected() {
        let verdict = validator().validate("SELECT id FROM t; -- comment");
        assert!(!verdict.is_valid());
        assert!(verdict.reason().contains("comment"), "{}", verdict.reason());
    }

    #[test]
    fn test_empty_input() {
        for input in ["", "   ", "\n\t"] {
            let verdict = validator().validate(input);
            assert_eq!(verdict.reason(), "No SQL query to validate");
        }
    }

    #[test]
    fn test_every_forbidden_keyword_is_cited() {
        for keyword in FORBIDDEN_KEYWORDS {
            let sql = format!("SELECT 1 FROM t WHERE x = 1 {} y", keyword.to_lowercase());
            let verdict = validator().validate(&sql);
            assert_eq!(
                verdict.reason(),
                format!("Forbidden operation: {}", keyword),
                "input: {}",
                sql
            );
        }
    }

    #[test]
    fn test_keywords_inside_identifiers_are_allowed() {
        let sql = "SELECT created_at, last_update, deleted FROM orders LIMIT 5";
        assert_eq!(valid_sql(sql), sql);
    }

    #[test]
    fn test_keyword_in_string_literal_is_rejected() {
        // Known limitation of keyword matching.
        let verdict = validator().validate("SELECT * FROM notes WHERE body = 'please delete me'");
        assert_eq!(verdict.reason(), "Forbidden operation: DELETE");
    }

    #[test]
    fn test_statement_kind() {
        for sql in ["SHOW TABLES", "EXPLAIN SELECT 1", "VACUUM", "PRAGMA table_info(t)"] {
            let verdict = validator().validate(sql);
            assert!(!verdict.is_valid(), "{}", sql);
            assert!(verdict.reason().starts_with("Only read queries"), "{}", sql);
        }
    }

    #[test]
    fn test_leading_whitespace_and_case() {
        assert_eq!(valid_sql("   select 1"), "select 1 LIMIT 100");
        let with = "\n  with t as (select 1 as x) select x from t";
        assert_eq!(
            valid_sql(with),
            "with t as (select 1 as x) select x from t LIMIT 100"
        );
    }

    #[test]
    fn test_block_comment_and_schema_probe() {
        let verdict = validator().validate("SELECT /* hint */ id FROM t");
        assert_eq!(
            verdict.reason(),
            "Dangerous pattern detected: block comment (/*)"
        );

        let verdict = validator()
            .validate("SELECT name FROM users UNION ALL SELECT table_name FROM information_schema.tables");
        assert!(verdict
            .reason()
            .contains("UNION ALL SELECT against information_schema"));
    }

    #[test]
    fn test_limit_goes_before_trailing_semicolon() {
        assert_eq!(valid_sql("SELECT 1;"), "SELECT 1 LIMIT 100;");
        assert_eq!(valid_sql("SELECT 1 ;;  "), "SELECT 1 LIMIT 100;");
        assert_eq!(valid_sql("SELECT 1\n"), "SELECT 1 LIMIT 100");
    }

    #[test]
    fn test_existing_limit_is_untouched() {
        let sql = "SELECT * FROM orders ORDER BY id DESC limit 5;";
        let verdict = validator().validate(sql);
        let validated = verdict.sql().unwrap();
        assert_eq!(validated.as_str(), sql);
        assert!(!validated.limit_injected());
    }

    #[test]
    fn test_exactly_one_limit_injected() {
        let out = valid_sql("SELECT * FROM orders WHERE total > 10;");
        assert_eq!(out.matches("LIMIT").count(), 1);
        assert!(out.ends_with(" LIMIT 100;"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        for sql in [
            "SELECT * FROM orders",
            "SELECT 1;",
            "WITH x AS (SELECT 1) SELECT * FROM x LIMIT 3",
        ] {
            let once = valid_sql(sql);
            let twice = valid_sql(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_configured_default_limit() {
        let verdict = SqlValidator::new(25).validate("SELECT * FROM orders");
        assert_eq!(
            verdict.sql().map(|s| s.as_str()),
            Some("SELECT * FROM orders LIMIT 25")
        );
    }

    #[test]
    fn test_verdict_serialization() {
        let invalid = validator().validate("DELETE FROM t");
        assert_eq!(
            serde_json::to_value(&invalid).unwrap(),
            serde_json::json!({"valid": false, "reason": "Forbidden operation: DELETE", "sql": null})
        );

        let valid = validator().validate("SELECT id FROM t;");
        assert_eq!(
            serde_json::to_value(&valid).unwrap(),
            serde_json::json!({"valid": true, "reason": "", "sql": "SELECT id FROM t LIMIT 100;"})
        );
    }
}
