use querygate_core::error::Result;
use querygate_core::pipeline::{GeneratedSql, GenerationContext, SqlGenerator};
use querygate_core::schema::types::*;
use querygate_core::DatabasePool;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// A small shop schema: customers, products, orders.
pub fn shop_schema() -> DatabaseSchema {
    let mut schema = DatabaseSchema::new(DatabaseType::PostgreSQL, "test_shop".to_string());

    let mut customers = Table::new("customers".to_string());
    customers.columns.insert(
        "id".to_string(),
        not_null(column("id", DataType::Serial, "integer", 1)),
    );
    customers.columns.insert(
        "email".to_string(),
        not_null(column("email", DataType::VarChar, "character varying(255)", 2)),
    );
    customers.columns.insert(
        "name".to_string(),
        column("name", DataType::VarChar, "character varying(100)", 3),
    );
    let mut tier = column("tier", DataType::Text, "text", 4);
    tier.default = Some("'basic'::text".to_string());
    customers.columns.insert("tier".to_string(), tier);
    customers.primary_key = Some(PrimaryKey {
        columns: vec!["id".to_string()],
        name: Some("customers_pkey".to_string()),
    });
    customers.indexes.push(Index {
        name: "customers_email_key".to_string(),
        columns: vec!["email".to_string()],
        unique: true,
    });
    schema.tables.insert("customers".to_string(), customers);

    let mut products = Table::new("products".to_string());
    products.columns.insert(
        "id".to_string(),
        not_null(column("id", DataType::Serial, "integer", 1)),
    );
    products.columns.insert(
        "title".to_string(),
        not_null(column("title", DataType::Text, "text", 2)),
    );
    products.columns.insert(
        "price".to_string(),
        not_null(column("price", DataType::Numeric, "numeric(10,2)", 3)),
    );
    products.primary_key = Some(PrimaryKey {
        columns: vec!["id".to_string()],
        name: Some("products_pkey".to_string()),
    });
    schema.tables.insert("products".to_string(), products);

    let mut orders = Table::new("orders".to_string());
    orders.columns.insert(
        "id".to_string(),
        not_null(column("id", DataType::Serial, "integer", 1)),
    );
    orders.columns.insert(
        "customer_id".to_string(),
        not_null(column("customer_id", DataType::Integer, "integer", 2)),
    );
    orders.columns.insert(
        "product_id".to_string(),
        not_null(column("product_id", DataType::Integer, "integer", 3)),
    );
    orders.columns.insert(
        "placed_at".to_string(),
        not_null(column(
            "placed_at",
            DataType::TimestampTz,
            "timestamp with time zone",
            4,
        )),
    );
    orders.primary_key = Some(PrimaryKey {
        columns: vec!["id".to_string()],
        name: Some("orders_pkey".to_string()),
    });
    orders.foreign_keys.push(ForeignKey {
        name: Some("orders_customer_id_fkey".to_string()),
        source_columns: vec!["customer_id".to_string()],
        referenced_table: "customers".to_string(),
        referenced_columns: vec!["id".to_string()],
    });
    orders.foreign_keys.push(ForeignKey {
        name: Some("orders_product_id_fkey".to_string()),
        source_columns: vec!["product_id".to_string()],
        referenced_table: "products".to_string(),
        referenced_columns: vec!["id".to_string()],
    });
    orders.indexes.push(Index {
        name: "idx_orders_placed_at".to_string(),
        columns: vec!["placed_at".to_string()],
        unique: false,
    });
    schema.tables.insert("orders".to_string(), orders);

    schema
}

fn column(name: &str, data_type: DataType, raw_type: &str, position: u32) -> Column {
    let mut col = Column::new(name.to_string(), data_type, raw_type.to_string());
    col.ordinal_position = position;
    col
}

fn not_null(mut col: Column) -> Column {
    col.nullable = false;
    col
}

const SHOP_DDL: &[&str] = &[
    "CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        email VARCHAR(255) NOT NULL UNIQUE,
        name VARCHAR(100),
        tier TEXT DEFAULT 'basic'
    )",
    "CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        price NUMERIC(10,2) NOT NULL
    )",
    "CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id),
        product_id INTEGER NOT NULL REFERENCES products(id),
        placed_at DATETIME NOT NULL
    )",
    "CREATE INDEX idx_orders_placed_at ON orders(placed_at)",
];

/// An in-memory SQLite shop with 3 customers, 4 products, and
/// `order_count` orders spread across them.
pub async fn sqlite_shop_pool(order_count: usize) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");

    for stmt in SHOP_DDL {
        sqlx::query(stmt).execute(&pool).await.expect("create shop table");
    }

    let customers = [
        (1, "ada@example.com", Some("Ada"), "gold"),
        (2, "grace@example.com", Some("Grace"), "basic"),
        (3, "anon@example.com", None, "basic"),
    ];
    for (id, email, name, tier) in customers {
        sqlx::query("INSERT INTO customers (id, email, name, tier) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(email)
            .bind(name)
            .bind(tier)
            .execute(&pool)
            .await
            .expect("insert customer");
    }

    let products = [
        (1, "Desk lamp", 24.5),
        (2, "Notebook", 3.25),
        (3, "Fountain pen", 48.0),
        (4, "Stapler", 12.75),
    ];
    for (id, title, price) in products {
        sqlx::query("INSERT INTO products (id, title, price) VALUES (?, ?, ?)")
            .bind(id)
            .bind(title)
            .bind(price)
            .execute(&pool)
            .await
            .expect("insert product");
    }

    for i in 0..order_count as i64 {
        sqlx::query(
            "INSERT INTO orders (id, customer_id, product_id, placed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(i + 1)
        .bind(i % 3 + 1)
        .bind(i % 4 + 1)
        .bind(format!("2024-03-{:02} 10:00:00", i % 28 + 1))
        .execute(&pool)
        .await
        .expect("insert order");
    }

    pool
}

/// [`sqlite_shop_pool`] wrapped for the pipeline.
pub async fn sqlite_shop(order_count: usize) -> DatabasePool {
    DatabasePool::Sqlite(sqlite_shop_pool(order_count).await)
}

/// Generator that answers every question with the same SQL and records
/// the schema text it was shown.
pub struct CannedSql {
    sql: String,
    seen_schema: std::sync::Mutex<Option<String>>,
}

impl CannedSql {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            seen_schema: std::sync::Mutex::new(None),
        }
    }

    /// Schema text from the most recent call.
    pub fn seen_schema(&self) -> Option<String> {
        self.seen_schema.lock().ok().and_then(|s| s.clone())
    }
}

impl SqlGenerator for CannedSql {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedSql> {
        if let Ok(mut seen) = self.seen_schema.lock() {
            *seen = Some(ctx.schema_text.to_string());
        }
        Ok(GeneratedSql::from(self.sql.clone()))
    }
}
