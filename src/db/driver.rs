//! The seam between the pool and an actual database driver.
//!
//! The transaction logic never talks to a driver directly. It needs a raw
//! connection that can run statements and open/close a transaction, and a raw
//! pool that hands such connections out. `db::backend` implements both on top
//! of sqlx; tests implement them with recording mocks.

use crate::error::DbResult;
use crate::models::{QueryParam, QueryResult};
use async_trait::async_trait;

/// One physical database connection checked out of a raw pool.
#[async_trait]
pub trait RawConnection: Send {
    /// Run `sql` with `params` exactly as given.
    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult>;

    async fn begin_transaction(&mut self) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Hand the connection back to the pool it came from. Cannot fail.
    fn release(self);

    /// Get rid of a connection whose transaction state is unknown, so that
    /// nobody else checks it out. The default just releases it.
    fn discard(self)
    where
        Self: Sized,
    {
        self.release()
    }
}

/// A pool of raw connections.
#[async_trait]
pub trait RawPool: Send + Sync {
    type Connection: RawConnection;

    /// Check out a connection for exclusive use.
    async fn get_connection(&self) -> DbResult<Self::Connection>;

    /// Run a single statement on whichever connection the pool picks.
    async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult>;

    /// Stop handing out connections. The default does nothing.
    async fn close(&self) {}
}
