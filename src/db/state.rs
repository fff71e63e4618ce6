//! Transaction state machine for a single connection.
//!
//! Every decision the connection wrapper makes about which statement to issue
//! is taken here, as a pure function of the current state and what just
//! happened. The wrapper only executes the chosen action.

/// Outer transaction state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    /// No transaction is open on the raw connection.
    #[default]
    Idle,
    /// A top-level transaction has been begun and not yet ended.
    InTransaction,
}

/// How a `transaction` call enters its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Issue `BEGIN`: this call owns the real transaction.
    Begin,
    /// Issue `SAVEPOINT`: this call is nested inside an open transaction.
    Savepoint,
}

/// Result of the unit of work run inside a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(_) => Self::Failed,
        }
    }
}

/// Statement that closes a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
    ReleaseSavepoint,
    RollbackToSavepoint,
}

/// The state to move to and the statement to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: TxState,
    pub action: Completion,
}

impl TxState {
    /// Whether a top-level transaction is open.
    pub fn is_open(self) -> bool {
        self == Self::InTransaction
    }

    /// Choose between a real transaction and a savepoint.
    pub fn entry(self) -> Entry {
        match self {
            Self::Idle => Entry::Begin,
            Self::InTransaction => Entry::Savepoint,
        }
    }

    /// State after `BEGIN` succeeded.
    pub fn begun(self) -> Self {
        Self::InTransaction
    }

    /// Decide how to close a scope once its unit of work has resolved.
    ///
    /// Closing the outer scope always returns to `Idle`, whether the chosen
    /// statement later succeeds or not. Commit suppression only affects the
    /// outer scope: savepoints are released normally and get discarded by the
    /// final rollback.
    pub fn settle(self, entry: Entry, outcome: Outcome, commits_disabled: bool) -> Transition {
        match entry {
            Entry::Begin => {
                let action = match outcome {
                    Outcome::Succeeded if !commits_disabled => Completion::Commit,
                    _ => Completion::Rollback,
                };
                Transition {
                    next: Self::Idle,
                    action,
                }
            }
            Entry::Savepoint => {
                let action = match outcome {
                    Outcome::Succeeded => Completion::ReleaseSavepoint,
                    Outcome::Failed => Completion::RollbackToSavepoint,
                };
                Transition { next: self, action }
            }
        }
    }
}
