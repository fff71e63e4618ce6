//! Connection wrapper with nested transaction support.
//!
//! A raw driver connection can hold a single transaction. Nested calls to
//! [`TransactionalConnection::transaction`] are turned into savepoints inside
//! that transaction, so a unit of work can call other units of work that open
//! transactions of their own without knowing whether one is already open.

use crate::db::driver::RawConnection;
use crate::db::state::{Completion, Entry, Outcome, TxState};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use futures_util::future::BoxFuture;
use tracing::debug;

/// Name of one savepoint and the statements that operate on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    /// Savepoint for the `n`th nested scope opened on a connection.
    pub fn numbered(n: u64) -> Self {
        Self {
            name: format!("savepoint{}", n),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_sql(&self) -> String {
        format!("SAVEPOINT {}", self.name)
    }

    pub fn release_sql(&self) -> String {
        format!("RELEASE SAVEPOINT {}", self.name)
    }

    pub fn rollback_sql(&self) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.name)
    }
}

/// A raw connection plus the transactional state needed to nest transactions.
///
/// The wrapper owns its raw connection exclusively. It is not meant to be
/// shared between concurrently running tasks; `&mut self` on every operation
/// enforces that.
pub struct TransactionalConnection<C> {
    raw: C,
    state: TxState,
    commits_disabled: bool,
    savepoint_counter: u64,
}

impl<C> std::fmt::Debug for TransactionalConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalConnection")
            .field("state", &self.state)
            .field("commits_disabled", &self.commits_disabled)
            .field("savepoint_counter", &self.savepoint_counter)
            .finish_non_exhaustive()
    }
}

impl<C: RawConnection> TransactionalConnection<C> {
    /// Wrap a raw connection. No transaction is assumed to be open on it.
    pub fn new(raw: C) -> Self {
        Self {
            raw,
            state: TxState::Idle,
            commits_disabled: false,
            savepoint_counter: 0,
        }
    }

    /// Run a statement on the raw connection, unchanged.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        self.raw.query(sql, params).await
    }

    /// Roll back every top-level transaction completed from now on, even
    /// when its unit of work succeeds.
    pub fn disable_commits(&mut self) {
        self.commits_disabled = true;
    }

    pub fn commits_disabled(&self) -> bool {
        self.commits_disabled
    }

    pub fn has_open_transaction(&self) -> bool {
        self.state.is_open()
    }

    /// Number of savepoints created on this connection so far.
    pub fn savepoint_count(&self) -> u64 {
        self.savepoint_counter
    }

    /// Give the raw connection back, dropping the transactional state.
    pub fn into_raw(self) -> C {
        self.raw
    }

    /// Run `work` inside a transaction.
    ///
    /// On an idle connection this issues `BEGIN`, runs `work`, then `COMMIT`
    /// (or `ROLLBACK` if `work` failed or commits are disabled). Inside an
    /// open transaction it uses `SAVEPOINT`, `RELEASE SAVEPOINT` and
    /// `ROLLBACK TO SAVEPOINT` instead, so nesting depth is unbounded.
    ///
    /// `work`'s error is returned unchanged unless the statement closing the
    /// scope fails, in which case that driver error is returned instead.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let id = conn
    ///     .transaction(|conn| {
    ///         Box::pin(async move {
    ///             conn.query("INSERT INTO users (name) VALUES (?)", &["ada".into()])
    ///                 .await?;
    ///             conn.transaction(|conn| {
    ///                 Box::pin(async move { conn.query("SELECT 1", &[]).await })
    ///             })
    ///             .await?;
    ///             Ok::<_, DbError>(1)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<F, T, E>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Self) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DbError> + Send,
    {
        match self.state.entry() {
            Entry::Begin => self.run_transaction(work).await,
            Entry::Savepoint => self.run_savepoint(work).await,
        }
    }

    async fn run_transaction<F, T, E>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Self) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DbError> + Send,
    {
        self.raw.begin_transaction().await?;
        self.state = self.state.begun();
        debug!(commits_disabled = self.commits_disabled, "Transaction started");

        let result = work(self).await;

        let transition = self
            .state
            .settle(Entry::Begin, Outcome::of(&result), self.commits_disabled);
        let completed = self.complete(transition.action, None).await;
        self.state = transition.next;

        debug!(
            action = ?transition.action,
            succeeded = completed.is_ok(),
            "Transaction ended"
        );

        finish(result, completed)
    }

    async fn run_savepoint<F, T, E>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Self) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DbError> + Send,
    {
        self.savepoint_counter += 1;
        let savepoint = Savepoint::numbered(self.savepoint_counter);

        self.raw.query(&savepoint.create_sql(), &[]).await?;
        debug!(savepoint = %savepoint.name(), "Savepoint created");

        let result = work(self).await;

        let transition =
            self.state
                .settle(Entry::Savepoint, Outcome::of(&result), self.commits_disabled);
        let completed = self.complete(transition.action, Some(&savepoint)).await;
        self.state = transition.next;

        debug!(
            savepoint = %savepoint.name(),
            action = ?transition.action,
            succeeded = completed.is_ok(),
            "Savepoint closed"
        );

        finish(result, completed)
    }

    /// Issue the statement that closes a scope.
    async fn complete(&mut self, action: Completion, savepoint: Option<&Savepoint>) -> DbResult<()> {
        match (action, savepoint) {
            (Completion::Commit, _) => self.raw.commit().await,
            (Completion::Rollback, _) => self.raw.rollback().await,
            (Completion::ReleaseSavepoint, Some(sp)) => {
                self.raw.query(&sp.release_sql(), &[]).await.map(|_| ())
            }
            (Completion::RollbackToSavepoint, Some(sp)) => {
                self.raw.query(&sp.rollback_sql(), &[]).await.map(|_| ())
            }
            (action, None) => Err(DbError::internal(format!(
                "{:?} requires a savepoint",
                action
            ))),
        }
    }
}

/// Combine the unit of work's result with the outcome of the closing
/// statement. A failed closing statement wins over anything `work` returned.
fn finish<T, E: From<DbError>>(result: Result<T, E>, completed: DbResult<()>) -> Result<T, E> {
    match completed {
        Ok(()) => result,
        Err(err) => Err(err.into()),
    }
}
