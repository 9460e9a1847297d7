use crate::error::{QueryGateError, Result};
use crate::schema::types::{DatabaseSchema, DatabaseType};

/// Trait for database schema introspection.
/// Each database backend implements this to extract schema metadata.
/// Implementations only issue read-only catalog queries.
pub trait SchemaIntrospector: Send + Sync {
    /// Introspect the database and return the full schema.
    fn introspect(&self) -> impl std::future::Future<Output = Result<DatabaseSchema>> + Send;
}

/// Determine the database type from a connection URL.
pub fn database_type_from_url(url: &str) -> Result<DatabaseType> {
    let scheme = url.split(':').next().unwrap_or("");
    match scheme {
        "postgres" | "postgresql" => Ok(DatabaseType::PostgreSQL),
        "mysql" | "mariadb" => Ok(DatabaseType::MySQL),
        "sqlite" | "file" => Ok(DatabaseType::SQLite),
        other => Err(QueryGateError::UnsupportedDatabase {
            scheme: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_url() {
        assert_eq!(
            database_type_from_url("postgres://localhost/shop").unwrap(),
            DatabaseType::PostgreSQL
        );
        assert_eq!(
            database_type_from_url("postgresql://u:p@db:5432/shop").unwrap(),
            DatabaseType::PostgreSQL
        );
        assert_eq!(
            database_type_from_url("mariadb://localhost/shop").unwrap(),
            DatabaseType::MySQL
        );
        assert_eq!(
            database_type_from_url("sqlite::memory:").unwrap(),
            DatabaseType::SQLite
        );
        assert_eq!(
            database_type_from_url("sqlite://dev.db").unwrap(),
            DatabaseType::SQLite
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = database_type_from_url("mssql://localhost/shop").unwrap_err();
        assert!(matches!(
            err,
            QueryGateError::UnsupportedDatabase { ref scheme } if scheme == "mssql"
        ));
    }
}
