//! Nested transactions for async SQL connection pools.
//!
//! A [`Pool`] wraps a raw driver pool (sqlx for MySQL, PostgreSQL and SQLite)
//! and runs units of work inside transactions. A `transaction` call made on a
//! connection that already has a transaction open becomes a savepoint, so
//! work can nest to any depth on one connection and a failure deep inside only
//! undoes its own part.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseConfig, PoolConfig, PoolOptions};
pub use db::{
    DbPool, Pool, PooledConnection, RawConnection, RawPool, TransactionalConnection, connect,
};
pub use error::{DbError, DbResult};
