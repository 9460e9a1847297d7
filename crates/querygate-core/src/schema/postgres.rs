use indexmap::IndexMap;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::{QueryGateError, Result};
use crate::schema::introspect::SchemaIntrospector;
use crate::schema::types::*;

pub struct PostgresIntrospector {
    pool: PgPool,
    schema_name: String,
}

impl PostgresIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_name: "public".to_string(),
        }
    }

    pub fn with_schema(pool: PgPool, schema_name: String) -> Self {
        Self { pool, schema_name }
    }

    async fn introspect_tables(&self) -> Result<IndexMap<String, Table>> {
        let query = "SELECT table_name::text AS table_name FROM information_schema.tables WHERE table_schema = $1 AND table_type IN ('BASE TABLE', 'VIEW') ORDER BY table_name";
        let rows = sqlx::query(query)
            .bind(&self.schema_name)
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
        let query = r#"
            SELECT
                c.table_name::text AS table_name,
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                c.udt_name::text AS udt_name,
                c.is_nullable::text AS is_nullable,
                c.column_default::text AS column_default,
                c.character_maximum_length::int4 AS character_maximum_length,
                c.ordinal_position::int4 AS ordinal_position
            FROM information_schema.columns c
            WHERE c.table_schema = $1
            ORDER BY c.table_name, c.ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.schema_name)
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
            let udt_name: String = row.get("udt_name");
            let is_nullable: String = row.get("is_nullable");
            let column_default: Option<String> = row.get("column_default");
            let max_length: Option<i32> = row.get("character_maximum_length");
            let ordinal_position: i32 = row.get("ordinal_position");

            let (data_type, raw_type) = if data_type_str == "USER-DEFINED" {
                (DataType::Enum(udt_name.clone()), udt_name)
            } else if data_type_str == "ARRAY" {
                // PostgreSQL arrays: udt_name starts with underscore
                let inner = udt_name.strip_prefix('_').unwrap_or(&udt_name);
                (
                    DataType::Array(Box::new(DataType::from_raw(inner))),
                    format!("{}[]", inner),
                )
            } else {
                let raw = match max_length {
                    Some(len) => format!("{}({})", data_type_str, len),
                    None => data_type_str.clone(),
                };
                (DataType::from_raw(&data_type_str), raw)
            };

            let mut column = Column::new(column_name.clone(), data_type, raw_type);
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
                tc.table_name::text AS table_name,
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = $1
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY tc.table_name, kcu.ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.schema_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch primary keys".to_string(),
                source: e,
            })?;

        // Group by table
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
                tc.table_name::text AS table_name,
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name,
                ccu.table_name::text AS referenced_table_name,
                ccu.column_name::text AS referenced_column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = $1
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.schema_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueryGateError::Introspection {
                query: "fetch foreign keys".to_string(),
                source: e,
            })?;

        // Group by (table_name, constraint_name)
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
            if !entry.source_columns.contains(&column_name) {
                entry.source_columns.push(column_name);
            }
            if !entry.referenced_columns.contains(&ref_column) {
                entry.referenced_columns.push(ref_column);
            }
        }

        for ((table_name, _), fk) in fk_map {
            if let Some(table) = tables.get_mut(&table_name) {
                table.foreign_keys.push(fk);
            }
        }

        Ok(())
    }

    async fn introspect_indexes(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        // information_schema has no index view; read pg_index directly.
        // Expression index members (attnum 0) drop out of the pg_attribute join.
        let query = r#"
            SELECT
                tc.relname::text AS table_name,
                ic.relname::text AS index_name,
                ix.indisunique AS is_unique,
                a.attname::text AS column_name
            FROM pg_index ix
            JOIN pg_class tc ON tc.oid = ix.indrelid
            JOIN pg_class ic ON ic.oid = ix.indexrelid
            JOIN pg_namespace n ON n.oid = tc.relnamespace
            CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = tc.oid AND a.attnum = k.attnum
            WHERE n.nspname = $1
                AND NOT ix.indisprimary
            ORDER BY tc.relname, ic.relname, k.ord
        "#;

        let rows = sqlx::query(query)
            .bind(&self.schema_name)
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
            let is_unique: bool = row.get("is_unique");
            let column_name: String = row.get("column_name");

            idx_map
                .entry((table_name, index_name.clone()))
                .or_insert_with(|| Index {
                    name: index_name,
                    columns: Vec::new(),
                    unique: is_unique,
                })
                .columns
                .push(column_name);
        }

        for ((table_name, _), index) in idx_map {
            if let Some(table) = tables.get_mut(&table_name) {
                table.indexes.push(index);
            }
        }

        Ok(())
    }
}

impl SchemaIntrospector for PostgresIntrospector {
    async fn introspect(&self) -> Result<DatabaseSchema> {
        let mut schema = DatabaseSchema::new(DatabaseType::PostgreSQL, self.schema_name.clone());

        schema.tables = self.introspect_tables().await?;
        self.introspect_columns(&mut schema.tables).await?;
        self.introspect_primary_keys(&mut schema.tables).await?;
        self.introspect_foreign_keys(&mut schema.tables).await?;
        self.introspect_indexes(&mut schema.tables).await?;

        tracing::debug!(
            "Introspected PostgreSQL schema '{}': {} tables, {} columns",
            self.schema_name,
            schema.table_count(),
            schema.column_count()
        );

        Ok(schema)
    }
}
