//! Data models shared by the pool, its connections and the drivers.

pub mod connection;
pub mod query;

pub use connection::DatabaseType;
pub use query::{ColumnMetadata, QueryParam, QueryResult};
