use indexmap::IndexMap;
use sqlx::mysql::MySqlPool;
use sqlx::Row;

use crate::error::{QueryGateError, Result};
use crate::schema::introspect::SchemaIntrospector;
use crate::schema::types::*;

pub struct MySqlIntrospector {
    pool: MySqlPool,
    database_name: String,
}

impl MySqlIntrospector {
    pub fn new(pool: MySqlPool, database_name: String) -> Self {
        Self {
            pool,
            database_name,
        }
    }

    async fn introspect_tables(&self) -> Result<IndexMap<String, Table>> {
        let query = "SELECT table_name AS table_name FROM information_schema.tables WHERE table_schema = ? AND table_type IN ('BASE TABLE', 'VIEW') ORDER BY table_name";
        let rows = sqlx::query(query)
            .bind(&self.database_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch tables".to_string(),
                source: e,
            })?;

        let mut tables = IndexMap::new();
        for row in rows {
            let name: String = row.get("table_name");
            tables.insert(name.clone(), Table::new(name));
        }
        Ok(tables)
    }

    async fn introspect_columns(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        // MySQL 8 reports information_schema columns in upper case unless aliased.
        let query = r#"
            SELECT
                table_name AS table_name,
                column_name AS column_name,
                data_type AS data_type,
                column_type AS column_type,
                is_nullable AS is_nullable,
                column_default AS column_default,
                CAST(ordinal_position AS SIGNED) AS ordinal_position
            FROM information_schema.columns
            WHERE table_schema = ?
            ORDER BY table_name, ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.database_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch columns".to_string(),
                source: e,
            })?;

        for row in rows {
            let table_name: String = row.get("table_name");
            let column_name: String = row.get("column_name");
            let data_type_str: String = row.get("data_type");
            let column_type: String = row.get("column_type");
            let is_nullable: String = row.get("is_nullable");
            let column_default: Option<String> = row.get("column_default");
            let ordinal_position: i64 = row.get("ordinal_position");

            let data_type = if data_type_str == "enum" || data_type_str == "set" {
                DataType::Enum(column_type.clone())
            } else {
                DataType::from_raw(&data_type_str)
            };

            // column_type keeps length and modifiers, e.g. "varchar(255)" or "int unsigned"
            let mut column = Column::new(column_name.clone(), data_type, column_type);
            column.nullable = is_nullable == "YES";
            column.default = column_default;
            column.ordinal_position = ordinal_position as u32;

            if let Some(table) = tables.get_mut(&table_name) {
                table.columns.insert(column_name, column);
            }
        }

        Ok(())
    }

    async fn introspect_primary_keys(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let query = r#"
            SELECT
                tc.table_name AS table_name,
                tc.constraint_name AS constraint_name,
                kcu.column_name AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.table_schema = ?
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY tc.table_name, kcu.ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.database_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch primary keys".to_string(),
                source: e,
            })?;

        let mut pk_map: IndexMap<String, (Option<String>, Vec<String>)> = IndexMap::new();
        for row in rows {
            let table_name: String = row.get("table_name");
            let constraint_name: String = row.get("constraint_name");
            let column_name: String = row.get("column_name");

            let entry = pk_map
                .entry(table_name)
                .or_insert_with(|| (Some(constraint_name), Vec::new()));
            entry.1.push(column_name);
        }

        for (table_name, (name, columns)) in pk_map {
            if let Some(table) = tables.get_mut(&table_name) {
                table.primary_key = Some(PrimaryKey { columns, name });
            }
        }

        Ok(())
    }

    async fn introspect_foreign_keys(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let query = r#"
            SELECT
                kcu.table_name AS table_name,
                kcu.constraint_name AS constraint_name,
                kcu.column_name AS column_name,
                kcu.referenced_table_name AS referenced_table_name,
                kcu.referenced_column_name AS referenced_column_name
            FROM information_schema.key_column_usage kcu
            WHERE kcu.table_schema = ?
                AND kcu.referenced_table_name IS NOT NULL
            ORDER BY kcu.table_name, kcu.constraint_name, kcu.ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.database_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch foreign keys".to_string(),
                source: e,
            })?;

        let mut fk_map: IndexMap<(String, String), ForeignKey> = IndexMap::new();
        for row in rows {
            let table_name: String = row.get("table_name");
            let constraint_name: String = row.get("constraint_name");
            let column_name: String = row.get("column_name");
            let ref_table: String = row.get("referenced_table_name");
            let ref_column: String = row.get("referenced_column_name");

            let key = (table_name, constraint_name.clone());
            let entry = fk_map.entry(key).or_insert_with(|| ForeignKey {
                name: Some(constraint_name),
                source_columns: Vec::new(),
                referenced_table: ref_table,
                referenced_columns: Vec::new(),
            });
            entry.source_columns.push(column_name);
            entry.referenced_columns.push(ref_column);
        }

        for ((table_name, _), fk) in fk_map {
            if let Some(table) = tables.get_mut(&table_name) {
                table.foreign_keys.push(fk);
            }
        }

        Ok(())
    }

    async fn introspect_indexes(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let query = r#"
            SELECT
                table_name AS table_name,
                index_name AS index_name,
                column_name AS column_name,
                CAST(non_unique AS SIGNED) AS non_unique
            FROM information_schema.statistics
            WHERE table_schema = ?
                AND index_name <> 'PRIMARY'
            ORDER BY table_name, index_name, seq_in_index
        "#;

        let rows = sqlx::query(query)
            .bind(&self.database_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch indexes".to_string(),
                source: e,
            })?;

        let mut idx_map: IndexMap<(String, String), Index> = IndexMap::new();
        for row in rows {
            let table_name: String = row.get("table_name");
            let index_name: String = row.get("index_name");
            // NULL for functional key parts
            let column_name: Option<String> = row.get("column_name");
            let non_unique: i64 = row.get("non_unique");

            let entry = idx_map
                .entry((table_name, index_name.clone()))
                .or_insert_with(|| Index {
                    name: index_name,
                    columns: Vec::new(),
                    unique: non_unique == 0,
                });
            if let Some(column_name) = column_name {
                entry.columns.push(column_name);
            }
        }

        for ((table_name, _), index) in idx_map {
            if let Some(table) = tables.get_mut(&table_name) {
                table.indexes.push(index);
            }
        }

        Ok(())
    }
}

impl SchemaIntrospector for MySqlIntrospector {
    async fn introspect(&self) -> Result<DatabaseSchema> {
        let mut schema = DatabaseSchema::new(DatabaseType::MySQL, self.database_name.clone());

        schema.tables = self.introspect_tables().await?;
        self.introspect_columns(&mut schema.tables).await?;
        self.introspect_primary_keys(&mut schema.tables).await?;
        self.introspect_foreign_keys(&mut schema.tables).await?;
        self.introspect_indexes(&mut schema.tables).await?;

        tracing::debug!(
            "Introspected MySQL database '{}': {} tables, {} columns",
            self.database_name,
            schema.table_count(),
            schema.column_count()
        );

        Ok(schema)
    }
}
