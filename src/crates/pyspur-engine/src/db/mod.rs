//! Durable storage: connection pooling and the SQLite `TaskStore` backend.

pub mod connection;
pub mod sqlite_store;

pub use connection::DatabaseConnection;
pub use sqlite_store::SqliteTaskStore;
