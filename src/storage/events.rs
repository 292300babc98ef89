//! Audit journal reads.
//!
//! Journal rows are written inside mutation transactions (see
//! [`crate::storage::sqlite::MutationContext`]); this module only reads
//! them back.

use crate::error::Result;
use crate::model::{EventType, IssueEvent};
use crate::storage::sqlite::{get_datetime, EngineStorage};
use chrono::Utc;
use rusqlite::Connection;

impl EngineStorage {
    /// Newest audit events for one issue, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn issue_events(
        &self,
        workspace_id: &str,
        issue_id: i64,
        limit: usize,
    ) -> Result<Vec<IssueEvent>> {
        get_events(&self.conn, workspace_id, issue_id, limit)
    }
}

/// Fetch the newest audit events for one issue, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_events(
    conn: &Connection,
    workspace_id: &str,
    issue_id: i64,
    limit: usize,
) -> Result<Vec<IssueEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, issue_id, event_type, actor, old_value, new_value, comment, created_at
         FROM issue_events
         WHERE workspace_id = ? AND issue_id = ?
         ORDER BY id DESC
         LIMIT ?",
    )?;

    let events = stmt
        .query_map(
            rusqlite::params![workspace_id, issue_id, limit as i64],
            |row| {
                Ok(IssueEvent {
                    id: row.get(0)?,
                    workspace_id: row.get(1)?,
                    issue_id: row.get(2)?,
                    event_type: row
                        .get::<_, String>(3)?
                        .parse::<EventType>()
                        .unwrap_or(EventType::Created),
                    actor: row.get(4)?,
                    old_value: row.get(5)?,
                    new_value: row.get(6)?,
                    comment: row.get(7)?,
                    created_at: get_datetime(row, 8)?.unwrap_or_else(Utc::now),
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
