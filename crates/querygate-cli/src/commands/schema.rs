use anyhow::Result;
use comfy_table::{Cell, Table as ComfyTable};

use querygate_core::schema::describe::describe_schema;
use querygate_core::DatabaseSchema;

use super::{connect, load_config, spinner};
use crate::args::{GlobalArgs, SchemaArgs, SchemaFormat};

pub async fn run(global: &GlobalArgs, args: &SchemaArgs) -> Result<()> {
    let config = load_config()?;
    let pool = connect(global, &config).await?;

    let pb = spinner("Analyzing database schema...");
    let schema = pool.introspect().await;
    pb.finish_and_clear();
    pool.close().await;
    let schema = schema?;

    match args.format {
        SchemaFormat::Json => println!("{}", serde_json::to_string_pretty(&schema)?),
        SchemaFormat::Text => println!("{}", describe_schema(&schema)),
        SchemaFormat::Table => print_tables(&schema),
    }
    Ok(())
}

fn print_tables(schema: &DatabaseSchema) {
    println!(
        "Database: {} ({})",
        schema.database_name, schema.database_type
    );
    println!(
        "Tables: {}  Columns: {}  Foreign Keys: {}",
        schema.table_count(),
        schema.column_count(),
        schema.foreign_key_count()
    );
    println!();

    for (table_name, table) in &schema.tables {
        println!("━━━ {} ━━━", table_name);

        let mut t = ComfyTable::new();
        t.set_header(vec!["Column", "Type", "Nullable", "PK", "FK", "Default"]);

        let pk_columns: Vec<&str> = table
            .primary_key
            .as_ref()
            .map(|pk| pk.columns.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default();

        for (col_name, column) in &table.columns {
            let is_pk = pk_columns.contains(&col_name.as_str());
            let fk_target = table.foreign_keys.iter().find_map(|fk| {
                fk.source_columns
                    .contains(col_name)
                    .then(|| format!("→ {}", fk.referenced_table))
            });

            t.add_row(vec![
                Cell::new(col_name),
                Cell::new(&column.raw_type),
                Cell::new(if column.nullable { "YES" } else { "NO" }),
                Cell::new(if is_pk { "PK" } else { "" }),
                Cell::new(fk_target.as_deref().unwrap_or("")),
                Cell::new(column.default.as_deref().unwrap_or("")),
            ]);
        }

        println!("{}", t);
        for index in &table.indexes {
            println!(
                "  {}index {} on ({})",
                if index.unique { "unique " } else { "" },
                index.name,
                index.columns.join(", ")
            );
        }
        println!();
    }
}
