use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level representation of a database schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub database_type: DatabaseType,
    pub database_name: String,
    pub tables: IndexMap<String, Table>,
}

impl DatabaseSchema {
    pub fn new(database_type: DatabaseType, database_name: String) -> Self {
        Self {
            database_type,
            database_name,
            tables: IndexMap::new(),
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn foreign_key_count(&self) -> usize {
        self.tables.values().map(|t| t.foreign_keys.len()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::PostgreSQL => write!(f, "PostgreSQL"),
            DatabaseType::MySQL => write!(f, "MySQL"),
            DatabaseType::SQLite => write!(f, "SQLite"),
        }
    }
}

/// Represents a database table with its columns, keys, and indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: IndexMap<String, Column>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: String) -> Self {
        Self {
            name,
            columns: IndexMap::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }
}

/// Represents a single column in a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    /// Type exactly as the database reports it (e.g. `character varying(255)`).
    pub raw_type: String,
    pub nullable: bool,
    /// Default expression as stored in the catalog, if any.
    pub default: Option<String>,
    pub ordinal_position: u32,
}

impl Column {
    pub fn new(name: String, data_type: DataType, raw_type: String) -> Self {
        Self {
            name,
            data_type,
            raw_type,
            nullable: true,
            default: None,
            ordinal_position: 0,
        }
    }
}

/// Normalized data type enum covering all supported databases.
///
/// Used both for introspected columns and for result-set columns, where the
/// driver's type name (`INT4`, `DECIMAL`, `DATETIME`, ...) picks the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Small integer (int2, smallint, tinyint)
    SmallInt,
    /// Standard integer (int4, integer, int)
    Integer,
    /// Large integer (int8, bigint)
    BigInt,
    /// Single-precision float (float4, real)
    Float,
    /// Double-precision float (float8, double precision)
    Double,
    /// Exact numeric with precision/scale (numeric, decimal)
    Numeric,
    /// Fixed-length string (char)
    Char,
    /// Variable-length string (varchar, character varying)
    VarChar,
    /// Unbounded text (text)
    Text,
    Boolean,
    Date,
    Time,
    /// Timestamp without timezone
    Timestamp,
    /// Timestamp with timezone
    TimestampTz,
    Uuid,
    Json,
    Jsonb,
    /// Binary/blob data (bytea, blob)
    Binary,
    /// Array type (PostgreSQL arrays)
    Array(Box<DataType>),
    /// Database-specific enum type
    Enum(String),
    Money,
    Interval,
    /// Serial (auto-incrementing integer, PG)
    Serial,
    /// Big serial (auto-incrementing bigint, PG)
    BigSerial,
    /// Unknown or unrecognized type
    Unknown(String),
}

impl DataType {
    /// Parse a raw SQL type string into a normalized DataType.
    ///
    /// Accepts both catalog spellings (`character varying(40)`) and driver
    /// type names (`VARCHAR`, `INT UNSIGNED`, `TIMESTAMPTZ`).
    pub fn from_raw(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        let normalized = normalized
            .strip_suffix(" unsigned")
            .unwrap_or(&normalized)
            .trim();

        // Handle array types first (PostgreSQL)
        if let Some(inner) = normalized.strip_suffix("[]") {
            return DataType::Array(Box::new(DataType::from_raw(inner)));
        }
        if let Some(inner) = normalized.strip_prefix('_') {
            if !inner.is_empty() {
                // PostgreSQL internal array type prefix
                return DataType::Array(Box::new(DataType::from_raw(inner)));
            }
        }

        // Drop a length/precision suffix: varchar(255) -> varchar
        let base = match normalized.find('(') {
            Some(idx) if !normalized.starts_with("character varying") => normalized[..idx].trim(),
            _ => normalized,
        };

        match base {
            // Integer types
            "smallint" | "int2" | "smallserial" | "serial2" | "tinyint" | "year" => {
                DataType::SmallInt
            }
            "integer" | "int" | "int4" | "mediumint" => DataType::Integer,
            "bigint" | "int8" => DataType::BigInt,
            "serial" | "serial4" => DataType::Serial,
            "bigserial" | "serial8" => DataType::BigSerial,

            // Float types
            "real" | "float4" | "float" => DataType::Float,
            "double precision" | "float8" | "double" => DataType::Double,

            // Numeric
            s if s.starts_with("numeric") || s.starts_with("decimal") => DataType::Numeric,

            // String types
            s if s.starts_with("character varying") || s.starts_with("varchar") => {
                DataType::VarChar
            }
            s if s.starts_with("char") || s.starts_with("character") || s == "bpchar" => {
                DataType::Char
            }
            "text" | "tinytext" | "mediumtext" | "longtext" | "clob" | "name" | "citext" => {
                DataType::Text
            }

            "boolean" | "bool" | "bit" => DataType::Boolean,

            // Date/time
            "date" => DataType::Date,
            "time" | "time without time zone" => DataType::Time,
            "timestamp" | "timestamp without time zone" | "datetime" => DataType::Timestamp,
            "timestamp with time zone" | "timestamptz" => DataType::TimestampTz,

            "uuid" => DataType::Uuid,

            "json" => DataType::Json,
            "jsonb" => DataType::Jsonb,

            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                DataType::Binary
            }

            "money" => DataType::Money,
            "interval" => DataType::Interval,

            "user-defined" => DataType::Unknown("USER-DEFINED".to_string()),

            other => DataType::Unknown(other.to_string()),
        }
    }

    /// Returns true if this type is a temporal type.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date | DataType::Time | DataType::Timestamp | DataType::TimestampTz
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::SmallInt => write!(f, "smallint"),
            DataType::Integer => write!(f, "integer"),
            DataType::BigInt => write!(f, "bigint"),
            DataType::Float => write!(f, "real"),
            DataType::Double => write!(f, "double precision"),
            DataType::Numeric => write!(f, "numeric"),
            DataType::Char => write!(f, "char"),
            DataType::VarChar => write!(f, "varchar"),
            DataType::Text => write!(f, "text"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Date => write!(f, "date"),
            DataType::Time => write!(f, "time"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::TimestampTz => write!(f, "timestamptz"),
            DataType::Uuid => write!(f, "uuid"),
            DataType::Json => write!(f, "json"),
            DataType::Jsonb => write!(f, "jsonb"),
            DataType::Binary => write!(f, "bytea"),
            DataType::Array(inner) => write!(f, "{}[]", inner),
            DataType::Enum(name) => write!(f, "enum({})", name),
            DataType::Money => write!(f, "money"),
            DataType::Interval => write!(f, "interval"),
            DataType::Serial => write!(f, "serial"),
            DataType::BigSerial => write!(f, "bigserial"),
            DataType::Unknown(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub columns: Vec<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub source_columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}
