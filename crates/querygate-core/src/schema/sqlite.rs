use indexmap::IndexMap;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{QueryGateError, Result};
use crate::schema::introspect::SchemaIntrospector;
use crate::schema::types::*;

pub struct SqliteIntrospector {
    pool: SqlitePool,
}

impl SqliteIntrospector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn introspect_tables(&self) -> Result<IndexMap<String, Table>> {
        let query = "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch tables".to_string(),
                source: e,
            })?;

        let mut tables = IndexMap::new();
        for row in rows {
            let name: String = row.get("name");
            tables.insert(name.clone(), Table::new(name));
        }
        Ok(tables)
    }

    async fn introspect_columns(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let table_names: Vec<String> = tables.keys().cloned().collect();
        for table_name in table_names {
            let query = format!("PRAGMA table_info(\"{}\")", table_name);
            let rows = sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| QueryGateError::Introspection {
                    query: format!("PRAGMA table_info({})", table_name),
                    source: e,
                })?;

            // (position in key, column) so composite keys keep key order
            let mut key_columns: Vec<(i32, String)> = Vec::new();
            for row in rows {
                let cid: i32 = row.get("cid");
                let name: String = row.get("name");
                let type_str: String = row.get("type");
                let notnull: i32 = row.get("notnull");
                let dflt_value: Option<String> = row.get("dflt_value");
                let pk: i32 = row.get("pk");

                let mut column = Column::new(name.clone(), DataType::from_raw(&type_str), type_str);
                column.nullable = notnull == 0 && pk == 0;
                column.default = dflt_value;
                column.ordinal_position = cid as u32 + 1;

                if pk > 0 {
                    key_columns.push((pk, name.clone()));
                }
                if let Some(table) = tables.get_mut(&table_name) {
                    table.columns.insert(name, column);
                }
            }

            if !key_columns.is_empty() {
                key_columns.sort_by_key(|(position, _)| *position);
                if let Some(table) = tables.get_mut(&table_name) {
                    table.primary_key = Some(PrimaryKey {
                        columns: key_columns.into_iter().map(|(_, name)| name).collect(),
                        name: None,
                    });
                }
            }
        }

        Ok(())
    }

    async fn introspect_foreign_keys(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let table_names: Vec<String> = tables.keys().cloned().collect();
        for table_name in table_names {
            let query = format!("PRAGMA foreign_key_list(\"{}\")", table_name);
            let rows = sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| QueryGateError::Introspection {
                    query: format!("PRAGMA foreign_key_list({})", table_name),
                    source: e,
                })?;

            // Group by id (FK id)
            let mut fk_map: IndexMap<i32, ForeignKey> = IndexMap::new();
            for row in &rows {
                let id: i32 = row.get("id");
                let table: String = row.get("table");
                let from: String = row.get("from");
                // NULL when the reference targets the parent's implicit primary key
                let to: Option<String> = row.get("to");

                let entry = fk_map.entry(id).or_insert_with(|| ForeignKey {
                    name: None,
                    source_columns: Vec::new(),
                    referenced_table: table,
                    referenced_columns: Vec::new(),
                });
                entry.source_columns.push(from);
                if let Some(to) = to {
                    entry.referenced_columns.push(to);
                }
            }

            if let Some(table) = tables.get_mut(&table_name) {
                table.foreign_keys.extend(fk_map.into_values());
            }
        }

        Ok(())
    }

    async fn introspect_indexes(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let table_names: Vec<String> = tables.keys().cloned().collect();
        for table_name in table_names {
            let query = format!("PRAGMA index_list(\"{}\")", table_name);
            let indexes = sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| QueryGateError::Introspection {
                    query: format!("PRAGMA index_list({})", table_name),
                    source: e,
                })?;

            for idx_row in &indexes {
                let unique: i32 = idx_row.get("unique");
                let idx_name: String = idx_row.get("name");
                let origin: String = idx_row.get("origin");

                // Primary key indexes are already reported as the table's primary key
                if origin == "pk" {
                    continue;
                }

                let info_query = format!("PRAGMA index_info(\"{}\")", idx_name);
                let cols = sqlx::query(&info_query)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| QueryGateError::Introspection {
                        query: format!("PRAGMA index_info({})", idx_name),
                        source: e,
                    })?;

                // Expression columns come back with a NULL name
                let columns: Vec<String> = cols
                    .iter()
                    .filter_map(|r| r.get::<Option<String>, _>("name"))
                    .collect();

                if let Some(table) = tables.get_mut(&table_name) {
                    table.indexes.push(Index {
                        name: idx_name,
                        columns,
                        unique: unique == 1,
                    });
                }
            }
        }

        Ok(())
    }
}

impl SchemaIntrospector for SqliteIntrospector {
    async fn introspect(&self) -> Result<DatabaseSchema> {
        let mut schema = DatabaseSchema::new(DatabaseType::SQLite, "main".to_string());

        schema.tables = self.introspect_tables().await?;
        self.introspect_columns(&mut schema.tables).await?;
        self.introspect_foreign_keys(&mut schema.tables).await?;
        self.introspect_indexes(&mut schema.tables).await?;

        tracing::debug!(
            "Introspected SQLite schema: {} tables, {} columns",
            schema.table_count(),
            schema.column_count()
        );

        Ok(schema)
    }
}
