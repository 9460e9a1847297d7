//! # Response Formatter
//!
//! Turns a [`ResultSet`] into the markdown report returned to the user: a
//! summary line, the SQL that ran, and a preview table of the first rows.

use crate::execute::ResultSet;
use crate::value::Scalar;

#[derive(Debug, Clone, Copy)]
pub struct ResponseFormatter {
    /// Rows rendered in the preview table.
    pub preview_rows: usize,
    /// Cell text longer than this is cut and suffixed with "...".
    pub max_cell_chars: usize,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self {
            preview_rows: 20,
            max_cell_chars: 50,
        }
    }
}

impl ResponseFormatter {
    pub fn new(preview_rows: usize, max_cell_chars: usize) -> Self {
        Self {
            preview_rows,
            max_cell_chars,
        }
    }

    pub fn format(&self, result: &ResultSet, sql: &str) -> String {
        if result.is_empty() {
            return format!(
                "No results found for your query.\n\n**Generated SQL:**\n```sql\n{}\n```",
                sql
            );
        }

        let mut parts = Vec::new();
        parts.push("Query executed successfully".to_string());

        let mut summary = format!("Found {} {}", result.row_count(), plural(result.row_count()));
        if result.truncated {
            summary.push_str(&format!(
                " (capped at {} rows; more may exist)",
                result.max_rows
            ));
        }
        parts.push(summary);
        parts.push(String::new());

        parts.push("**Generated SQL:**".to_string());
        parts.push(format!("```sql\n{}\n```", sql));
        parts.push(String::new());

        parts.push("**Results:**".to_string());
        parts.push(self.table(result));

        if result.row_count() > self.preview_rows {
            parts.push(String::new());
            parts.push(format!(
                "*... and {} more rows*",
                result.row_count() - self.preview_rows
            ));
        }

        parts.join("\n")
    }

    pub fn format_failure(&self, message: &str) -> String {
        format!("Error: {}", message)
    }

    fn table(&self, result: &ResultSet) -> String {
        let headers: Vec<String> = result.columns.iter().map(|c| self.cell(c)).collect();
        let mut lines = Vec::with_capacity(self.preview_rows.min(result.row_count()) + 2);
        lines.push(format!("| {} |", headers.join(" | ")));
        lines.push(format!("| {} |", vec!["---"; headers.len()].join(" | ")));

        for row in result.rows.iter().take(self.preview_rows) {
            let values: Vec<String> = result
                .columns
                .iter()
                .map(|col| match row.get(col) {
                    Some(Scalar::Null) | None => "NULL".to_string(),
                    Some(value) => self.cell(&value.to_string()),
                })
                .collect();
            lines.push(format!("| {} |", values.join(" | ")));
        }

        lines.join("\n")
    }

    fn cell(&self, text: &str) -> String {
        let shortened = if text.chars().count() > self.max_cell_chars {
            let keep = self.max_cell_chars.saturating_sub(3);
            let mut cut: String = text.chars().take(keep).collect();
            cut.push_str("...");
            cut
        } else {
            text.to_string()
        };
        shortened
            .replace("\r\n", " ")
            .replace(['\n', '\r'], " ")
            .replace('|', "\\|")
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "result"
    } else {
        "results"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::Row;

    fn result_with(rows: Vec<Row>, max_rows: usize) -> ResultSet {
        let columns = rows
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        ResultSet {
            truncated: rows.len() == max_rows,
            columns,
            rows,
            max_rows,
        }
    }

    fn row(id: i64, name: Scalar) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), Scalar::Integer(id));
        row.insert("name".to_string(), name);
        row
    }

    #[test]
    fn test_format_basic_report() {
        let result = result_with(
            vec![
                row(1, Scalar::Text("Ada".to_string())),
                row(2, Scalar::Null),
            ],
            100,
        );
        let text = ResponseFormatter::default().format(&result, "SELECT id, name FROM users LIMIT 100");

        assert!(text.starts_with("Query executed successfully\nFound 2 results\n"));
        assert!(text.contains("```sql\nSELECT id, name FROM users LIMIT 100\n```"));
        assert!(text.contains("| id | name |\n| --- | --- |\n| 1 | Ada |\n| 2 | NULL |"));
        assert!(!text.contains("more rows"));
        assert!(!text.contains("capped"));
    }

    #[test]
    fn test_empty_result() {
        let result = result_with(Vec::new(), 100);
        let text = ResponseFormatter::default().format(&result, "SELECT 1 WHERE 1 = 0");
        assert!(text.starts_with("No results found for your query."));
        assert!(text.contains("SELECT 1 WHERE 1 = 0"));
    }

    #[test]
    fn test_preview_limit_and_remainder_line() {
        let rows = (1..=25)
            .map(|i| row(i, Scalar::Text(format!("user{}", i))))
            .collect();
        let result = result_with(rows, 25);
        let text = ResponseFormatter::default().format(&result, "SELECT 1");

        assert!(text.contains("| 20 | user20 |"));
        assert!(!text.contains("| 21 | user21 |"));
        assert!(text.ends_with("*... and 5 more rows*"));
        assert!(text.contains("capped at 25 rows"));
    }

    #[test]
    fn test_long_cells_are_cut() {
        let long = "x".repeat(80);
        let result = result_with(vec![row(1, Scalar::Text(long))], 100);
        let text = ResponseFormatter::default().format(&result, "SELECT 1");
        let expected = format!("| 1 | {}... |", "x".repeat(47));
        assert!(text.contains(&expected), "{}", text);
    }

    #[test]
    fn test_cell_escaping() {
        let fmt = ResponseFormatter::default();
        assert_eq!(fmt.cell("a|b"), "a\\|b");
        assert_eq!(fmt.cell("line one\nline two"), "line one line two");
        assert_eq!(fmt.cell("crlf\r\nend"), "crlf end");
    }

    #[test]
    fn test_cut_counts_characters_not_bytes() {
        let fmt = ResponseFormatter::new(20, 5);
        assert_eq!(fmt.cell("héllo wörld"), "hé...");
        assert_eq!(fmt.cell("héllo"), "héllo");
    }

    #[test]
    fn test_format_failure() {
        let fmt = ResponseFormatter::default();
        assert_eq!(
            fmt.format_failure("Forbidden operation: DROP"),
            "Error: Forbidden operation: DROP"
        );
    }
}
