//! Evaluation associations and cascades.
//!
//! The result-to-issue mapping is an append-only log: merging never
//! rewrites history, it appends newer assignments pointing at the merge
//! target. The cascades mutate the evaluation configuration linked to an
//! issue when its lifecycle state changes; only live-capable evaluation
//! versions are touched, in both directions.

use crate::error::Result;
use crate::model::TriggerMode;
use crate::storage::sqlite::EngineStorage;
use crate::util::to_db_time;
use chrono::{DateTime, Utc};
use rusqlite::Transaction;

/// Append assignments pointing every result of `source_issue_id` at
/// `target_issue_id`. Historical rows are kept untouched. Returns the
/// number of results reassigned.
pub(crate) fn reassign_on_merge(
    tx: &Transaction<'_>,
    workspace_id: &str,
    source_issue_id: i64,
    target_issue_id: i64,
    at: DateTime<Utc>,
) -> Result<usize> {
    let inserted = tx.execute(
        "INSERT INTO issue_evaluation_results
             (workspace_id, issue_id, evaluation_result_id, created_at)
         SELECT DISTINCT workspace_id, ?, evaluation_result_id, ?
         FROM issue_evaluation_results
         WHERE workspace_id = ? AND issue_id = ?",
        rusqlite::params![
            target_issue_id,
            to_db_time(at),
            workspace_id,
            source_issue_id
        ],
    )?;
    Ok(inserted)
}

/// Mute every live-capable evaluation version linked to the issue:
/// stamp `ignored_at` and stop evaluating live logs.
pub(crate) fn ignore_linked_evaluations(
    tx: &Transaction<'_>,
    workspace_id: &str,
    issue_id: i64,
    at: DateTime<Utc>,
) -> Result<usize> {
    let updated = tx.execute(
        "UPDATE evaluation_versions
         SET ignored_at = ?, evaluate_live_logs = 0
         WHERE workspace_id = ? AND issue_id = ? AND live_capable = 1",
        rusqlite::params![to_db_time(at), workspace_id, issue_id],
    )?;
    Ok(updated)
}

/// Unmute every live-capable evaluation version linked to the issue:
/// clear `ignored_at`, re-enable live evaluation, and reset the trigger
/// back to evaluating every interaction.
pub(crate) fn unignore_linked_evaluations(
    tx: &Transaction<'_>,
    workspace_id: &str,
    issue_id: i64,
) -> Result<usize> {
    let updated = tx.execute(
        "UPDATE evaluation_versions
         SET ignored_at = NULL, evaluate_live_logs = 1, trigger_mode = ?
         WHERE workspace_id = ? AND issue_id = ? AND live_capable = 1",
        rusqlite::params![
            TriggerMode::EveryInteraction.as_str(),
            workspace_id,
            issue_id
        ],
    )?;
    Ok(updated)
}

impl EngineStorage {
    /// The issue an evaluation result currently belongs to: the most
    /// recently created assignment whose issue is not merged. This is the
    /// only admissible mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn find_last_active_assignment(
        &self,
        workspace_id: &str,
        evaluation_result_id: i64,
    ) -> Result<Option<i64>> {
        use rusqlite::OptionalExtension as _;

        let issue_id = self
            .conn
            .query_row(
                "SELECT ier.issue_id
                 FROM issue_evaluation_results ier
                 JOIN issues i ON i.id = ier.issue_id
                 WHERE ier.workspace_id = ?
                   AND ier.evaluation_result_id = ?
                   AND i.merged_at IS NULL
                 ORDER BY ier.id DESC
                 LIMIT 1",
                rusqlite::params![workspace_id, evaluation_result_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(issue_id)
    }
}
