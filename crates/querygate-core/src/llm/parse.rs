//! # LLM Response Parser
//!
//! Pulls the SQL statement out of a model completion. Models often wrap
//! the query in markdown fences or add a sentence of preamble, so
//! extraction tries, in order:
//!
//! 1. The body of the first ```` ```sql ```` (or bare ```` ``` ````) fence
//! 2. The first line starting with SELECT or WITH, up to the first `;`
//! 3. The whole response with any fence lines dropped
//!
//! The result always ends with exactly one `;`. Whatever comes back is
//! still untrusted and goes through the validator.

use crate::error::{QueryGateError, Result};

/// Extract a single SQL statement from a model response.
pub fn extract_sql(response: &str) -> Result<String> {
    let candidate = from_fence(response)
        .or_else(|| from_statement_start(response))
        .unwrap_or_else(|| strip_fence_lines(response));

    let sql = candidate.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        return Err(QueryGateError::Generation {
            message: format!(
                "Model returned no SQL. Response: {}",
                truncate(response.trim(), 200)
            ),
        });
    }
    Ok(format!("{};", sql))
}

fn from_fence(response: &str) -> Option<String> {
    let start = response.find("```")?;
    let after = &response[start + 3..];
    // Skip the info string ("sql", "SQL", "postgresql", ...) up to the newline
    let body_start = match after.find('\n') {
        Some(nl) if after[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => nl + 1,
        _ => 0,
    };
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    let sql = body[..end].trim();
    (!sql.is_empty()).then(|| sql.to_string())
}

fn from_statement_start(response: &str) -> Option<String> {
    let mut offset = 0;
    for line in response.split_inclusive('\n') {
        let upper = line.trim_start().to_uppercase();
        if upper.starts_with("SELECT") || upper.starts_with("WITH") {
            let rest = &response[offset + (line.len() - line.trim_start().len())..];
            let end = rest.find(';').unwrap_or(rest.len());
            return Some(rest[..end].trim().to_string());
        }
        offset += line.len();
    }
    None
}

fn strip_fence_lines(response: &str) -> String {
    response
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}
