pub mod describe;
pub mod introspect;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod types;
