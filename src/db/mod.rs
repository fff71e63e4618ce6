//! Database abstraction layer.
//!
//! - `state`: the transaction state machine
//! - `connection`: a raw connection wrapped with transaction and savepoint tracking
//! - `pool`: the pool entry points and the checked-out connection guard
//! - `driver`: the traits a database driver implements
//! - `backend`: the sqlx implementation of those traits

pub mod backend;
pub mod connection;
pub mod driver;
#[macro_use]
pub mod macros;
pub(crate) mod params;
pub mod pool;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{DbConnection, DbPool, connect};
pub use connection::{Savepoint, TransactionalConnection};
pub use driver::{RawConnection, RawPool};
pub use pool::{Pool, PooledConnection};
pub use state::TxState;
