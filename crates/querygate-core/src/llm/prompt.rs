//! # Prompt Templates
//!
//! Builds the SQL generation prompt: dialect, schema text from
//! [`describe_schema`](crate::schema::describe::describe_schema), the rules
//! the model must follow, and the user's question.

use crate::schema::types::DatabaseType;

/// Quoting advice differs per backend.
fn identifier_rule(dialect: DatabaseType) -> &'static str {
    match dialect {
        DatabaseType::PostgreSQL | DatabaseType::SQLite => {
            "Use double quotes for case-sensitive or unusual identifiers (e.g., \"userId\", \"createdAt\")"
        }
        DatabaseType::MySQL => {
            "Use backticks for case-sensitive or unusual identifiers (e.g., `userId`, `createdAt`)"
        }
    }
}

fn date_rule(dialect: DatabaseType) -> &'static str {
    match dialect {
        DatabaseType::PostgreSQL => "Date filtering: use DATE_TRUNC() or date comparison operators",
        DatabaseType::MySQL => "Date filtering: use DATE(), DATE_FORMAT() or date comparison operators",
        DatabaseType::SQLite => "Date filtering: use date(), strftime() or string comparison on ISO dates",
    }
}

fn text_search_rule(dialect: DatabaseType) -> &'static str {
    match dialect {
        DatabaseType::PostgreSQL => "Text search: use ILIKE for case-insensitive matching",
        DatabaseType::MySQL | DatabaseType::SQLite => {
            "Text search: use LIKE (case-insensitive for ASCII) or LOWER(column) LIKE LOWER(pattern)"
        }
    }
}

/// Generate a SQL generation prompt for one question.
pub fn sql_generation_prompt(
    question: &str,
    schema_text: &str,
    dialect: DatabaseType,
    default_limit: usize,
) -> String {
    format!(
        r#"You are an expert {dialect} query generator. Convert the natural language question to SQL.

DATABASE SCHEMA:
{schema_text}

STRICT RULES:
1. Generate ONLY a single SELECT query (a WITH ... SELECT is allowed). Never modify data or schema.
2. {identifier_rule}
3. Use single quotes for string values
4. Always use explicit JOIN syntax, never implicit joins
5. Add appropriate WHERE clauses for filtering
6. Include ORDER BY for sorted results
7. Add a LIMIT clause to prevent large result sets (default: LIMIT {default_limit})
8. Use aggregate functions (COUNT, SUM, AVG, etc.) when appropriate
9. Handle NULL values properly with IS NULL/IS NOT NULL
10. Use DISTINCT when uniqueness is required
11. Do not use SQL comments

COMMON PATTERNS:
- {date_rule}
- {text_search_rule}
- Counting: use COUNT(*) for row counts, COUNT(DISTINCT column) for unique counts
- Grouping: always include non-aggregate columns in GROUP BY
- Only reference tables and columns listed in the schema above

QUESTION: {question}

Generate a single {dialect} query. Return ONLY the SQL query without any explanation or markdown:
"#,
        dialect = dialect,
        schema_text = schema_text,
        identifier_rule = identifier_rule(dialect),
        default_limit = default_limit,
        date_rule = date_rule(dialect),
        text_search_rule = text_search_rule(dialect),
        question = question.trim(),
    )
}
