//! Connection pool with transaction entry points.
//!
//! [`Pool`] sits on top of a raw driver pool. Top-level calls check out a raw
//! connection, wrap it in a fresh [`TransactionalConnection`], run the unit of
//! work and hand the connection back. Calls that already hold a connection
//! pass it in and are delegated to it directly, so all nested work runs on the
//! same raw connection and nothing is released until the outermost call ends.

use crate::config::PoolConfig;
use crate::db::connection::TransactionalConnection;
use crate::db::driver::{RawConnection, RawPool};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use futures_util::future::BoxFuture;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

const RELEASED_MSG: &str = "BUG: pooled connection used after release";

/// Connection pool that nests transactions through savepoints.
#[derive(Debug)]
pub struct Pool<P> {
    raw: P,
    config: PoolConfig,
}

impl<P: RawPool> Pool<P> {
    /// Wrap a raw pool.
    pub fn new(raw: P, config: PoolConfig) -> Self {
        Self { raw, config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Access the underlying driver pool.
    pub fn raw(&self) -> &P {
        &self.raw
    }

    /// Run a single statement.
    ///
    /// With `existing`, the statement runs on that connection (and inside
    /// whatever transaction it has open). Otherwise the raw pool runs it on a
    /// connection of its choosing and takes care of returning it.
    pub async fn query(
        &self,
        sql: &str,
        params: &[QueryParam],
        existing: Option<&mut TransactionalConnection<P::Connection>>,
    ) -> DbResult<QueryResult> {
        match existing {
            Some(conn) => conn.query(sql, params).await,
            None => self.raw.query(sql, params).await,
        }
    }

    /// Run `work` inside a transaction.
    ///
    /// With `existing`, this is exactly `existing.transaction(work)`: a
    /// savepoint if the connection already has a transaction open, and no
    /// connection is acquired or released. Without it, a connection is
    /// acquired for the duration of the call and released afterwards whatever
    /// the outcome. An acquisition failure is returned without running `work`.
    pub async fn transaction<F, T, E>(
        &self,
        work: F,
        existing: Option<&mut TransactionalConnection<P::Connection>>,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut TransactionalConnection<P::Connection>) -> BoxFuture<'c, Result<T, E>>
            + Send,
        T: Send,
        E: From<DbError> + Send,
    {
        let mut lease = self.lease(existing).await?;
        let result = lease.conn().transaction(work).await;
        lease.finish();
        result
    }

    /// Run `callback` on a single connection without opening a transaction.
    ///
    /// With `existing`, the callback gets that connection and its lifecycle
    /// stays with whoever acquired it. Otherwise a connection is acquired,
    /// handed to the callback and released afterwards; the callback's result
    /// is returned unchanged.
    pub async fn with_connection<F, T, E>(
        &self,
        callback: F,
        existing: Option<&mut TransactionalConnection<P::Connection>>,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut TransactionalConnection<P::Connection>) -> BoxFuture<'c, Result<T, E>>
            + Send,
        E: From<DbError>,
    {
        let mut lease = self.lease(existing).await?;
        let result = callback(lease.conn()).await;
        lease.finish();
        result
    }

    /// The connection a `transaction` or `with_connection` call runs on.
    async fn lease<'a>(
        &self,
        existing: Option<&'a mut TransactionalConnection<P::Connection>>,
    ) -> DbResult<Lease<'a, P::Connection>> {
        Ok(match existing {
            Some(conn) => Lease::Borrowed(conn),
            None => Lease::Acquired(self.acquire().await?),
        })
    }

    /// Check out a raw connection and wrap it.
    ///
    /// The returned guard hands the raw connection back to the pool when
    /// [`PooledConnection::release`] is called or when it is dropped.
    pub async fn acquire(&self) -> DbResult<PooledConnection<P::Connection>> {
        let raw = self.raw.get_connection().await?;
        let mut conn = TransactionalConnection::new(raw);
        if self.config.disable_commits {
            conn.disable_commits();
        }
        debug!(
            commits_disabled = conn.commits_disabled(),
            "Connection acquired"
        );
        Ok(PooledConnection::new(conn))
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.raw.close().await;
    }
}

/// A connection either passed in by the caller or acquired for one call.
///
/// Only an acquired connection is released by [`finish`](Self::finish).
enum Lease<'a, C: RawConnection> {
    Borrowed(&'a mut TransactionalConnection<C>),
    Acquired(PooledConnection<C>),
}

impl<C: RawConnection> Lease<'_, C> {
    fn conn(&mut self) -> &mut TransactionalConnection<C> {
        match self {
            Lease::Borrowed(conn) => &mut **conn,
            Lease::Acquired(guard) => &mut **guard,
        }
    }

    fn finish(self) {
        if let Lease::Acquired(guard) = self {
            guard.release();
        }
    }
}

/// RAII guard for a connection checked out of a [`Pool`].
///
/// Dereferences to the [`TransactionalConnection`] wrapping the raw
/// connection. The raw connection is released exactly once: by
/// [`release`](Self::release), or by `Drop` if the owning future panicked or
/// was cancelled first. A guard dropped in the middle of a transaction
/// discards the raw connection instead, so the half-finished transaction
/// never reaches another caller.
pub struct PooledConnection<C: RawConnection> {
    conn: Option<TransactionalConnection<C>>,
}

impl<C: RawConnection> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish()
    }
}

impl<C: RawConnection> PooledConnection<C> {
    fn new(conn: TransactionalConnection<C>) -> Self {
        Self { conn: Some(conn) }
    }

    /// Return the raw connection to the pool.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.into_raw().release();
            debug!("Connection released");
        }
    }
}

impl<C: RawConnection> Deref for PooledConnection<C> {
    type Target = TransactionalConnection<C>;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect(RELEASED_MSG)
    }
}

impl<C: RawConnection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect(RELEASED_MSG)
    }
}

impl<C: RawConnection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.has_open_transaction() {
                warn!("Connection dropped inside an open transaction - discarding it");
                conn.into_raw().discard();
            } else {
                warn!("Connection released via Drop - consider using explicit release()");
                conn.into_raw().release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::{MockError, MockPool};
    use futures_util::FutureExt;

    fn pool(raw: MockPool) -> Pool<MockPool> {
        Pool::new(raw, PoolConfig::default())
    }

    #[tokio::test]
    async fn test_transaction_success_call_order() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let value = pool
            .transaction(|_| async { Ok::<_, DbError>(42) }.boxed(), None)
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            log.calls(),
            vec!["get_connection", "begin", "commit", "release"]
        );
    }

    #[tokio::test]
    async fn test_transaction_failure_call_order() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let result = pool
            .transaction(
                |_| async { Err::<(), _>(MockError::Work("E")) }.boxed(),
                None,
            )
            .await;

        assert_eq!(result, Err(MockError::Work("E")));
        assert_eq!(
            log.calls(),
            vec!["get_connection", "begin", "rollback", "release"]
        );
    }

    #[tokio::test]
    async fn test_transaction_releases_when_commit_fails() {
        let err = DbError::driver("commit failed", None);
        let pool = pool(MockPool::new().fail_commit(err.clone()));
        let log = pool.raw().log();

        let result = pool
            .transaction(|_| async { Ok::<_, DbError>(()) }.boxed(), None)
            .await;

        assert_eq!(result, Err(err));
        assert_eq!(log.count("release"), 1);
    }

    #[tokio::test]
    async fn test_transaction_releases_when_rollback_fails() {
        let err = DbError::driver("rollback failed", None);
        let pool = pool(MockPool::new().fail_rollback(err.clone()));
        let log = pool.raw().log();

        let result = pool
            .transaction(
                |_| async { Err::<(), _>(MockError::Work("E")) }.boxed(),
                None,
            )
            .await;

        assert_eq!(result, Err(MockError::Db(err)));
        assert_eq!(log.count("release"), 1);
    }

    #[tokio::test]
    async fn test_acquire_failure_skips_work() {
        let err = DbError::acquire("pool exhausted");
        let pool = pool(MockPool::new().fail_acquire(err.clone()));
        let log = pool.raw().log();

        let result = pool
            .transaction(|_| async { Ok::<_, DbError>(()) }.boxed(), None)
            .await;

        assert_eq!(result, Err(err));
        assert_eq!(log.calls(), vec!["get_connection"]);
    }

    #[tokio::test]
    async fn test_nested_pool_transaction_reuses_connection() {
        let pool = std::sync::Arc::new(pool(MockPool::new()));
        let log = pool.raw().log();
        let inner_pool = pool.clone();

        pool.transaction(
            move |conn| {
                async move {
                    inner_pool
                        .transaction(|_| async { Ok::<_, DbError>(()) }.boxed(), Some(conn))
                        .await
                }
                .boxed()
            },
            None,
        )
        .await
        .unwrap();

        assert_eq!(
            log.calls(),
            vec![
                "get_connection",
                "begin",
                "query: SAVEPOINT savepoint1",
                "query: RELEASE SAVEPOINT savepoint1",
                "commit",
                "release",
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_connection_is_never_released() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();
        let mut conn = pool.acquire().await.unwrap();

        pool.transaction(|_| async { Ok::<_, DbError>(()) }.boxed(), Some(&mut *conn))
            .await
            .unwrap();
        assert_eq!(log.count("release"), 0);

        conn.release();
        assert_eq!(
            log.calls(),
            vec!["get_connection", "begin", "commit", "release"]
        );
    }

    #[tokio::test]
    async fn test_disable_commits_config_applies_to_new_connections() {
        let config = PoolConfig {
            disable_commits: true,
            ..PoolConfig::default()
        };
        let pool = Pool::new(MockPool::new(), config);
        let log = pool.raw().log();

        let value = pool
            .transaction(|_| async { Ok::<_, DbError>("kept") }.boxed(), None)
            .await
            .unwrap();

        assert_eq!(value, "kept");
        assert_eq!(
            log.calls(),
            vec!["get_connection", "begin", "rollback", "release"]
        );
    }

    #[tokio::test]
    async fn test_query_without_connection_uses_pool() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let result = pool
            .query("SELECT ?", &[QueryParam::Int(1)], None)
            .await
            .unwrap();

        assert_eq!(result.rows[0]["params"], 1);
        assert_eq!(log.calls(), vec!["pool query: SELECT ?"]);
    }

    #[tokio::test]
    async fn test_query_with_connection_uses_it() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();
        let mut conn = pool.acquire().await.unwrap();

        pool.query("SELECT 1", &[], Some(&mut *conn)).await.unwrap();
        conn.release();

        assert_eq!(
            log.calls(),
            vec!["get_connection", "query: SELECT 1", "release"]
        );
    }

    #[tokio::test]
    async fn test_with_connection_releases_on_error() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let result = pool
            .with_connection(
                |conn| {
                    async move {
                        conn.query("SELECT 1", &[]).await?;
                        Err::<(), _>(MockError::Work("after query"))
                    }
                    .boxed()
                },
                None,
            )
            .await;

        assert_eq!(result, Err(MockError::Work("after query")));
        assert_eq!(
            log.calls(),
            vec!["get_connection", "query: SELECT 1", "release"]
        );
    }

    #[tokio::test]
    async fn test_with_existing_connection_does_not_acquire() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();
        let mut conn = pool.acquire().await.unwrap();

        let open = pool
            .with_connection(
                |conn| async move { Ok::<_, DbError>(conn.has_open_transaction()) }.boxed(),
                Some(&mut *conn),
            )
            .await
            .unwrap();

        assert!(!open);
        assert_eq!(log.count("get_connection"), 1);
        assert_eq!(log.count("release"), 0);
        drop(conn);
        assert_eq!(log.count("release"), 1);
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_once() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let conn = pool.acquire().await.unwrap();
        drop(conn);

        assert_eq!(log.calls(), vec!["get_connection", "release"]);
    }

    #[tokio::test]
    async fn test_cancelled_transaction_discards_connection() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let unfinished = pool.transaction(
            |conn| {
                async move {
                    conn.query("INSERT", &[]).await?;
                    futures_util::future::pending::<Result<(), DbError>>().await
                }
                .boxed()
            },
            None,
        );
        // One poll runs up to the pending await, then the future is dropped
        assert!(unfinished.now_or_never().is_none());

        assert_eq!(
            log.calls(),
            vec!["get_connection", "begin", "query: INSERT", "discard"]
        );
    }

    #[tokio::test]
    async fn test_with_connection_cancelled_outside_transaction_releases() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();

        let unfinished = pool.with_connection(
            |_| futures_util::future::pending::<Result<(), DbError>>().boxed(),
            None,
        );
        assert!(unfinished.now_or_never().is_none());

        assert_eq!(log.calls(), vec!["get_connection", "release"]);
    }

    #[tokio::test]
    async fn test_close_delegates_to_raw_pool() {
        let pool = pool(MockPool::new());
        let log = pool.raw().log();
        pool.close().await;
        assert_eq!(log.calls(), vec!["close"]);
    }
}
