//! Recording driver used by unit tests.
//!
//! Every call is appended to a shared log so tests can assert the exact
//! statement sequence, and any operation can be told to fail.

use crate::db::driver::{RawConnection, RawPool};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Error type for units of work under test.
#[derive(Debug, Clone, PartialEq)]
pub enum MockError {
    Work(&'static str),
    Db(DbError),
}

impl From<DbError> for MockError {
    fn from(err: DbError) -> Self {
        Self::Db(err)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

#[derive(Debug, Clone, Default)]
struct Failures {
    begin: Option<DbError>,
    commit: Option<DbError>,
    rollback: Option<DbError>,
    /// Statement prefix and the error a matching query fails with.
    statements: Vec<(String, DbError)>,
}

#[derive(Debug, Default)]
pub struct MockConnection {
    log: CallLog,
    failures: Failures,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn fail_begin(mut self, err: DbError) -> Self {
        self.failures.begin = Some(err);
        self
    }

    pub fn fail_commit(mut self, err: DbError) -> Self {
        self.failures.commit = Some(err);
        self
    }

    pub fn fail_rollback(mut self, err: DbError) -> Self {
        self.failures.rollback = Some(err);
        self
    }

    pub fn fail_on(mut self, prefix: &str, err: DbError) -> Self {
        self.failures.statements.push((prefix.to_string(), err));
        self
    }
}

fn outcome(err: &Option<DbError>) -> DbResult<()> {
    match err {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

/// Result echoing the statement it was produced for.
fn echo(sql: &str, params: &[QueryParam]) -> QueryResult {
    let mut row = serde_json::Map::new();
    row.insert("sql".to_string(), sql.into());
    row.insert("params".to_string(), params.len().into());
    QueryResult {
        rows: vec![row],
        ..QueryResult::default()
    }
}

#[async_trait]
impl RawConnection for MockConnection {
    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        self.log.push(format!("query: {}", sql));
        match self
            .failures
            .statements
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            Some((_, err)) => Err(err.clone()),
            None => Ok(echo(sql, params)),
        }
    }

    async fn begin_transaction(&mut self) -> DbResult<()> {
        self.log.push("begin");
        outcome(&self.failures.begin)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.log.push("commit");
        outcome(&self.failures.commit)
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.log.push("rollback");
        outcome(&self.failures.rollback)
    }

    fn release(self) {
        self.log.push("release");
    }

    fn discard(self) {
        self.log.push("discard");
    }
}

/// Pool handing out [`MockConnection`]s that share the pool's log.
#[derive(Debug, Default)]
pub struct MockPool {
    log: CallLog,
    acquire_error: Option<DbError>,
    connection_failures: Failures,
}

impl MockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn fail_acquire(mut self, err: DbError) -> Self {
        self.acquire_error = Some(err);
        self
    }

    pub fn fail_commit(mut self, err: DbError) -> Self {
        self.connection_failures.commit = Some(err);
        self
    }

    pub fn fail_rollback(mut self, err: DbError) -> Self {
        self.connection_failures.rollback = Some(err);
        self
    }
}

#[async_trait]
impl RawPool for MockPool {
    type Connection = MockConnection;

    async fn get_connection(&self) -> DbResult<MockConnection> {
        self.log.push("get_connection");
        if let Some(err) = &self.acquire_error {
            return Err(err.clone());
        }
        Ok(MockConnection {
            log: self.log.clone(),
            failures: self.connection_failures.clone(),
        })
    }

    async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        self.log.push(format!("pool query: {}", sql));
        Ok(echo(sql, params))
    }

    async fn close(&self) {
        self.log.push("close");
    }
}
