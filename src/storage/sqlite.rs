//! `SQLite` storage implementation.
//!
//! All reads and writes are tenant-scoped: every query's predicate list
//! begins with `workspace_id = ?`. A missing tenancy filter is a defect.

use crate::error::{EngineError, Result};
use crate::model::{EvaluationVersion, EventType, Issue, TriggerMode};
use crate::storage::schema::apply_schema;
use crate::util::{parse_datetime, to_db_time};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::Duration;

/// Default writer wait before `SQLITE_BUSY` surfaces, outside explicit
/// no-wait lock acquisitions.
pub(crate) const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// SQLite-backed storage for the issue engine.
#[derive(Debug)]
pub struct EngineStorage {
    pub(crate) conn: Connection,
}

/// Context for a mutation operation, tracking audit side effects.
pub struct MutationContext {
    pub op_name: String,
    pub actor: String,
    events: Vec<PendingEvent>,
}

struct PendingEvent {
    workspace_id: String,
    issue_id: i64,
    event_type: EventType,
    old_value: Option<String>,
    new_value: Option<String>,
    comment: Option<String>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Queue an audit journal entry; written when the transaction commits.
    pub fn record_event(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        event_type: EventType,
        comment: Option<String>,
    ) {
        self.events.push(PendingEvent {
            workspace_id: workspace_id.to_string(),
            issue_id,
            event_type,
            old_value: None,
            new_value: None,
            comment,
        });
    }

    /// Queue an audit entry carrying old and new values.
    pub fn record_field_change(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(PendingEvent {
            workspace_id: workspace_id.to_string(),
            issue_id,
            event_type,
            old_value,
            new_value,
            comment: None,
        });
    }
}

impl EngineStorage {
    /// Open a new connection to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// application fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Execute a mutation inside one immediate transaction.
    ///
    /// Audit events queued on the context are written before commit, so a
    /// rolled-back mutation leaves no journal trace.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the transaction is rolled back.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        write_events(&tx, &ctx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get an issue by id within a workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_issue(&self, workspace_id: &str, issue_id: i64) -> Result<Option<Issue>> {
        fetch_issue(&self.conn, workspace_id, issue_id)
    }

    /// Get an issue or fail with the not-found error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IssueNotFound`] if absent in the tenant scope.
    pub fn require_issue(&self, workspace_id: &str, issue_id: i64) -> Result<Issue> {
        self.get_issue(workspace_id, issue_id)?
            .ok_or_else(|| EngineError::IssueNotFound {
                id: issue_id.to_string(),
            })
    }

    /// Count issues in a workspace. Mostly useful in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count_issues(&self, workspace_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM issues WHERE workspace_id = ?",
            [workspace_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Insert a commit into the visible-history scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. duplicate uuid).
    pub fn insert_commit(
        &mut self,
        workspace_id: &str,
        uuid: &str,
        title: &str,
        version: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO commits (workspace_id, uuid, title, version) VALUES (?, ?, ?, ?)",
            rusqlite::params![workspace_id, uuid, title, version],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Register a document as present in a commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_document_version(
        &mut self,
        workspace_id: &str,
        commit_id: i64,
        document_uuid: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO document_versions (workspace_id, commit_id, document_uuid)
             VALUES (?, ?, ?)",
            rusqlite::params![workspace_id, commit_id, document_uuid],
        )?;
        Ok(())
    }

    /// Insert an evaluation result (an occurrence source row).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_evaluation_result(
        &mut self,
        workspace_id: &str,
        commit_id: i64,
        document_uuid: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO evaluation_results (workspace_id, commit_id, document_uuid, created_at)
             VALUES (?, ?, ?, ?)",
            rusqlite::params![workspace_id, commit_id, document_uuid, to_db_time(created_at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert an evaluation version linked to an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_evaluation_version(
        &mut self,
        workspace_id: &str,
        issue_id: Option<i64>,
        live_capable: bool,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO evaluation_versions (workspace_id, issue_id, live_capable)
             VALUES (?, ?, ?)",
            rusqlite::params![workspace_id, issue_id, i64::from(live_capable)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get an evaluation version by id within a workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_evaluation_version(
        &self,
        workspace_id: &str,
        id: i64,
    ) -> Result<Option<EvaluationVersion>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, workspace_id, issue_id, ignored_at, evaluate_live_logs,
                        trigger_mode, live_capable
                 FROM evaluation_versions WHERE workspace_id = ? AND id = ?",
                rusqlite::params![workspace_id, id],
                evaluation_version_from_row,
            )
            .optional()?;
        Ok(result)
    }
}

pub(crate) fn write_events(tx: &Transaction<'_>, ctx: &MutationContext) -> Result<()> {
    for event in &ctx.events {
        tx.execute(
            "INSERT INTO issue_events
                 (workspace_id, issue_id, event_type, actor, old_value, new_value, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                event.workspace_id,
                event.issue_id,
                event.event_type.as_str(),
                ctx.actor,
                event.old_value,
                event.new_value,
                event.comment,
                to_db_time(Utc::now()),
            ],
        )?;
    }
    Ok(())
}

/// The issue column list, prefixed with a table alias when joining.
pub(crate) fn issue_columns(alias: &str) -> String {
    let prefix = if alias.is_empty() {
        String::new()
    } else {
        format!("{alias}.")
    };
    [
        "id",
        "uuid",
        "workspace_id",
        "project_id",
        "document_uuid",
        "title",
        "description",
        "first_seen_result_id",
        "last_seen_result_id",
        "resolved_at",
        "ignored_at",
        "merged_at",
        "merged_to_issue_id",
        "escalating_at",
        "created_at",
        "updated_at",
    ]
    .iter()
    .map(|col| format!("{prefix}{col}"))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Map an issue row selected with [`issue_columns`] starting at index 0.
pub(crate) fn issue_from_row(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        uuid: row.get(1)?,
        workspace_id: row.get(2)?,
        project_id: row.get(3)?,
        document_uuid: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        first_seen_result_id: row.get(7)?,
        last_seen_result_id: row.get(8)?,
        resolved_at: get_datetime(row, 9)?,
        ignored_at: get_datetime(row, 10)?,
        merged_at: get_datetime(row, 11)?,
        merged_to_issue_id: row.get(12)?,
        escalating_at: get_datetime(row, 13)?,
        created_at: get_datetime(row, 14)?.unwrap_or_else(Utc::now),
        updated_at: get_datetime(row, 15)?.unwrap_or_else(Utc::now),
    })
}

pub(crate) fn get_datetime(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .as_deref()
        .map(parse_datetime))
}

fn evaluation_version_from_row(row: &rusqlite::Row) -> rusqlite::Result<EvaluationVersion> {
    Ok(EvaluationVersion {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        issue_id: row.get(2)?,
        ignored_at: get_datetime(row, 3)?,
        evaluate_live_logs: row.get::<_, i64>(4)? != 0,
        trigger_mode: row
            .get::<_, String>(5)?
            .parse::<TriggerMode>()
            .unwrap_or_default(),
        live_capable: row.get::<_, i64>(6)? != 0,
    })
}

/// Fetch an issue inside or outside a transaction; tenancy filter first.
pub(crate) fn fetch_issue(
    conn: &Connection,
    workspace_id: &str,
    issue_id: i64,
) -> Result<Option<Issue>> {
    let sql = format!(
        "SELECT {} FROM issues WHERE workspace_id = ? AND id = ?",
        issue_columns("")
    );
    let result = conn
        .query_row(&sql, rusqlite::params![workspace_id, issue_id], issue_from_row)
        .optional()?;
    Ok(result)
}

/// Fetch an issue or fail with not-found, for use inside transactions.
pub(crate) fn require_issue_tx(
    tx: &Transaction<'_>,
    workspace_id: &str,
    issue_id: i64,
) -> Result<Issue> {
    fetch_issue(tx, workspace_id, issue_id)?.ok_or_else(|| EngineError::IssueNotFound {
        id: issue_id.to_string(),
    })
}
