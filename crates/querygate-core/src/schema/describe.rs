//! Plain-text schema description.
//!
//! The generator prompt embeds this text, so the output must be stable for a
//! given schema: tables in introspection order, columns in ordinal order.

use crate::schema::types::{DatabaseSchema, Table};

/// Render the whole schema, one block per table separated by blank lines.
pub fn describe_schema(schema: &DatabaseSchema) -> String {
    schema
        .tables
        .values()
        .map(describe_table)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render a single table block.
///
/// ```text
/// Table: orders
///   - id: integer (NOT NULL)
///   - note: text (nullable)
///   Primary Key: id
///   Foreign Key: customer_id -> customers.id
///   Index: idx_orders_created on (created_at)
/// ```
pub fn describe_table(table: &Table) -> String {
    let mut lines = vec![format!("Table: {}", table.name)];

    for column in table.columns.values() {
        let nullable = if column.nullable {
            " (nullable)"
        } else {
            " (NOT NULL)"
        };
        let default = match column.default.as_deref() {
            Some(expr) if !expr.is_empty() => format!(" DEFAULT {}", expr),
            _ => String::new(),
        };
        lines.push(format!(
            "  - {}: {}{}{}",
            column.name, column.raw_type, nullable, default
        ));
    }

    if let Some(pk) = &table.primary_key {
        if !pk.columns.is_empty() {
            lines.push(format!("  Primary Key: {}", pk.columns.join(", ")));
        }
    }

    for fk in &table.foreign_keys {
        lines.push(format!(
            "  Foreign Key: {} -> {}.{}",
            fk.source_columns.join(", "),
            fk.referenced_table,
            fk.referenced_columns.join(", ")
        ));
    }

    // Unique indexes are implied by constraints and add noise to the prompt
    for index in table.indexes.iter().filter(|i| !i.unique) {
        lines.push(format!(
            "  Index: {} on ({})",
            index.name,
            index.columns.join(", ")
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::*;

    fn orders_table() -> Table {
        let mut table = Table::new("orders".to_string());

        let mut id = Column::new("id".to_string(), DataType::Integer, "integer".to_string());
        id.nullable = false;
        id.default = Some("nextval('orders_id_seq'::regclass)".to_string());
        table.columns.insert("id".to_string(), id);

        let mut customer_id = Column::new(
            "customer_id".to_string(),
            DataType::Integer,
            "integer".to_string(),
        );
        customer_id.nullable = false;
        table.columns.insert("customer_id".to_string(), customer_id);

        table.columns.insert(
            "note".to_string(),
            Column::new("note".to_string(), DataType::Text, "text".to_string()),
        );

        table.primary_key = Some(PrimaryKey {
            columns: vec!["id".to_string()],
            name: Some("orders_pkey".to_string()),
        });
        table.foreign_keys.push(ForeignKey {
            name: Some("orders_customer_id_fkey".to_string()),
            source_columns: vec!["customer_id".to_string()],
            referenced_table: "customers".to_string(),
            referenced_columns: vec!["id".to_string()],
        });
        table.indexes.push(Index {
            name: "idx_orders_created".to_string(),
            columns: vec!["created_at".to_string()],
            unique: false,
        });
        table.indexes.push(Index {
            name: "orders_reference_key".to_string(),
            columns: vec!["reference".to_string()],
            unique: true,
        });
        table
    }

    #[test]
    fn test_describe_table_layout() {
        let text = describe_table(&orders_table());
        let expected = "\
Table: orders
  - id: integer (NOT NULL) DEFAULT nextval('orders_id_seq'::regclass)
  - customer_id: integer (NOT NULL)
  - note: text (nullable)
  Primary Key: id
  Foreign Key: customer_id -> customers.id
  Index: idx_orders_created on (created_at)";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_unique_indexes_are_omitted() {
        let text = describe_table(&orders_table());
        assert!(!text.contains("orders_reference_key"));
    }

    #[test]
    fn test_describe_schema_separates_tables() {
        let mut schema = DatabaseSchema::new(DatabaseType::PostgreSQL, "public".to_string());
        schema
            .tables
            .insert("customers".to_string(), Table::new("customers".to_string()));
        schema.tables.insert("orders".to_string(), orders_table());

        let text = describe_schema(&schema);
        assert!(text.starts_with("Table: customers\n\nTable: orders\n"));
        assert_eq!(text, describe_schema(&schema));
    }

    #[test]
    fn test_describe_empty_schema() {
        let schema = DatabaseSchema::new(DatabaseType::SQLite, "main".to_string());
        assert_eq!(describe_schema(&schema), "");
    }
}
