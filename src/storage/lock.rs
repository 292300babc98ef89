//! Per-issue exclusive locking.
//!
//! SQLite serializes writers at the database level, so an immediate
//! transaction doubles as the row lock: whoever opens it first owns every
//! row until commit or rollback. The wait policy decides what happens when
//! the lock is already held elsewhere — block until it frees, or fail fast
//! with [`crate::error::EngineError::LockUnavailable`] so the caller can
//! surface a "try again" instead of queuing.
//!
//! Acquisition is scoped: the closure runs inside the transaction and the
//! lock is released on every exit path, including errors and panics
//! (dropping the transaction rolls it back).

use crate::error::Result;
use crate::storage::sqlite::{
    require_issue_tx, EngineStorage, MutationContext, DEFAULT_BUSY_TIMEOUT,
};
use rusqlite::{Transaction, TransactionBehavior};
use std::time::Duration;

/// How long a blocking acquisition waits before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// What to do when the lock is held by another operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Block until the holder commits or rolls back.
    #[default]
    Wait,
    /// Fail immediately with [`crate::error::EngineError::LockUnavailable`].
    NoWait,
}

impl EngineStorage {
    /// Run `f` while holding the exclusive lock on one issue.
    ///
    /// The issue is verified to exist in the tenant before `f` runs.
    /// Audit events queued on the context are written before commit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::LockUnavailable`] when the
    /// lock is contended and the policy is [`WaitPolicy::NoWait`];
    /// [`crate::error::EngineError::IssueNotFound`] when the issue is
    /// absent in the workspace; otherwise whatever `f` returns.
    pub fn with_issue_lock<F, R>(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        policy: WaitPolicy,
        op: &str,
        actor: &str,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let timeout = match policy {
            WaitPolicy::Wait => WAIT_TIMEOUT,
            WaitPolicy::NoWait => Duration::ZERO,
        };
        self.conn.busy_timeout(timeout)?;

        let result = self.locked_mutation(workspace_id, issue_id, op, actor, f);

        // Restore the default before surfacing any error so one contended
        // call does not change the connection's behavior for the next.
        self.conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        result
    }

    fn locked_mutation<F, R>(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        op: &str,
        actor: &str,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        // Immediate behavior takes the writer lock up front; with a zero
        // busy timeout this is where SQLITE_BUSY surfaces and becomes
        // LockUnavailable via the error conversion.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        require_issue_tx(&tx, workspace_id, issue_id)?;

        let mut ctx = MutationContext::new(op, actor);
        let result = f(&tx, &mut ctx)?;

        super::sqlite::write_events(&tx, &ctx)?;
        tx.commit()?;
        Ok(result)
    }
}
