//! The guarded lifecycle service.
//!
//! Every transition runs under the per-issue lock, inside one transaction
//! spanning the issue mutation, the evaluation cascade, and the audit
//! journal entry, so a cascade failure rolls the state change back. Guard
//! violations surface as unprocessable errors and are never retried here.
//! Domain events are returned (and logged) only after the commit.

use crate::config::EngineConfig;
use crate::engine::association;
use crate::engine::stats::recent_occurrence_count;
use crate::error::{EngineError, Result};
use crate::model::{
    DomainEvent, DomainEventKind, EventType, Issue, IssueState, Transition, TransitionError,
};
use crate::storage::lock::WaitPolicy;
use crate::storage::sqlite::{require_issue_tx, EngineStorage};
use crate::util::{generate_uuid, to_db_time};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Transaction};

impl EngineStorage {
    /// Mark an issue resolved. Optionally mutes its linked evaluations.
    ///
    /// # Errors
    ///
    /// Fails with an unprocessable error when the issue is already
    /// resolved, ignored, or merged.
    pub fn resolve(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        ignore_evaluations: bool,
        actor: &str,
        policy: WaitPolicy,
    ) -> Result<(Issue, DomainEvent)> {
        self.transition_at(
            workspace_id,
            issue_id,
            Transition::Resolve { ignore_evaluations },
            actor,
            policy,
            Utc::now(),
        )
    }

    /// Reopen a resolved issue. Unconditionally unmutes linked evaluations
    /// and re-enables their live-evaluation trigger.
    ///
    /// # Errors
    ///
    /// Fails with an unprocessable error unless the issue is resolved.
    pub fn unresolve(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        actor: &str,
        policy: WaitPolicy,
    ) -> Result<(Issue, DomainEvent)> {
        self.transition_at(
            workspace_id,
            issue_id,
            Transition::Unresolve,
            actor,
            policy,
            Utc::now(),
        )
    }

    /// Mute an issue and its linked evaluations.
    ///
    /// # Errors
    ///
    /// Fails with an unprocessable error when the issue is resolved,
    /// already ignored, or merged.
    pub fn ignore(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        actor: &str,
        policy: WaitPolicy,
    ) -> Result<(Issue, DomainEvent)> {
        self.transition_at(
            workspace_id,
            issue_id,
            Transition::Ignore,
            actor,
            policy,
            Utc::now(),
        )
    }

    /// Unmute an issue and its linked evaluations.
    ///
    /// # Errors
    ///
    /// Fails with an unprocessable error unless the issue is ignored.
    pub fn unignore(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        actor: &str,
        policy: WaitPolicy,
    ) -> Result<(Issue, DomainEvent)> {
        self.transition_at(
            workspace_id,
            issue_id,
            Transition::Unignore,
            actor,
            policy,
            Utc::now(),
        )
    }

    /// Apply a lifecycle transition at an explicit time. The public
    /// wrappers pass the current time; callers replaying history or
    /// testing time-sensitive behavior pass their own.
    ///
    /// # Errors
    ///
    /// Guard violations return [`EngineError::Unprocessable`]; lock
    /// contention under [`WaitPolicy::NoWait`] returns
    /// [`EngineError::LockUnavailable`]. Either way no row changes.
    pub fn transition_at(
        &mut self,
        workspace_id: &str,
        issue_id: i64,
        transition: Transition,
        actor: &str,
        policy: WaitPolicy,
        at: DateTime<Utc>,
    ) -> Result<(Issue, DomainEvent)> {
        let (op, kind, event_type) = match transition {
            Transition::Resolve { .. } => {
                ("resolve_issue", DomainEventKind::IssueResolved, EventType::Resolved)
            }
            Transition::Unresolve => (
                "unresolve_issue",
                DomainEventKind::IssueUnresolved,
                EventType::Unresolved,
            ),
            Transition::Ignore => {
                ("ignore_issue", DomainEventKind::IssueIgnored, EventType::Ignored)
            }
            Transition::Unignore => (
                "unignore_issue",
                DomainEventKind::IssueUnignored,
                EventType::Unignored,
            ),
        };

        let outcome = self.with_issue_lock(workspace_id, issue_id, policy, op, actor, |tx, ctx| {
            let issue = require_issue_tx(tx, workspace_id, issue_id)?;
            let state = issue.state();

            let new_state = match transition {
                Transition::Resolve { .. } => state.resolve(at),
                Transition::Unresolve => state.unresolve(),
                Transition::Ignore => state.ignore(at),
                Transition::Unignore => state.unignore(),
            }
            .map_err(guard_violation)?;

            write_state(tx, workspace_id, issue_id, new_state, at)?;

            match transition {
                Transition::Resolve {
                    ignore_evaluations: true,
                }
                | Transition::Ignore => {
                    association::ignore_linked_evaluations(tx, workspace_id, issue_id, at)?;
                }
                Transition::Unresolve | Transition::Unignore => {
                    association::unignore_linked_evaluations(tx, workspace_id, issue_id)?;
                }
                Transition::Resolve {
                    ignore_evaluations: false,
                } => {}
            }

            ctx.record_event(workspace_id, issue_id, event_type, None);
            require_issue_tx(tx, workspace_id, issue_id)
        })?;

        let event = DomainEvent {
            kind,
            workspace_id: workspace_id.to_string(),
            issue_id,
            user_email: actor.to_string(),
        };
        tracing::info!(
            op,
            workspace_id,
            issue_id,
            actor,
            "lifecycle transition committed"
        );
        Ok((outcome, event))
    }

    /// Fold `source_issue_id` into `target_issue_id`: terminal for the
    /// source, and every result ever assigned to the source gains a newer
    /// assignment pointing at the target.
    ///
    /// # Errors
    ///
    /// Fails with an unprocessable error when the source is already
    /// merged, the target is merged, or source and target are the same.
    pub fn merge(
        &mut self,
        workspace_id: &str,
        source_issue_id: i64,
        target_issue_id: i64,
        actor: &str,
        policy: WaitPolicy,
    ) -> Result<Issue> {
        self.merge_at(
            workspace_id,
            source_issue_id,
            target_issue_id,
            actor,
            policy,
            Utc::now(),
        )
    }

    /// [`Self::merge`] at an explicit time.
    ///
    /// # Errors
    ///
    /// See [`Self::merge`].
    pub fn merge_at(
        &mut self,
        workspace_id: &str,
        source_issue_id: i64,
        target_issue_id: i64,
        actor: &str,
        policy: WaitPolicy,
        at: DateTime<Utc>,
    ) -> Result<Issue> {
        self.with_issue_lock(
            workspace_id,
            source_issue_id,
            policy,
            "merge_issue",
            actor,
            |tx, ctx| {
                if source_issue_id == target_issue_id {
                    return Err(guard_violation(TransitionError::MergeIntoSelf));
                }

                let source = require_issue_tx(tx, workspace_id, source_issue_id)?;
                let target = require_issue_tx(tx, workspace_id, target_issue_id)?;
                if target.state().is_merged() {
                    return Err(guard_violation(TransitionError::TargetMerged));
                }

                let new_state = source
                    .state()
                    .merge(at, target_issue_id)
                    .map_err(guard_violation)?;
                write_state(tx, workspace_id, source_issue_id, new_state, at)?;

                let moved = association::reassign_on_merge(
                    tx,
                    workspace_id,
                    source_issue_id,
                    target_issue_id,
                    at,
                )?;

                ctx.record_event(
                    workspace_id,
                    source_issue_id,
                    EventType::Merged,
                    Some(format!(
                        "Merged into issue {target_issue_id}, {moved} results reassigned"
                    )),
                );

                require_issue_tx(tx, workspace_id, source_issue_id)
            },
        )
    }

    /// Record one evaluation failure occurrence.
    ///
    /// Creates the issue when the document has no matching open
    /// (non-merged) issue with the same title; otherwise appends an
    /// association to the existing issue and advances its last-seen
    /// pointer. Flags the issue as escalating when its recent occurrence
    /// count reaches the configured threshold.
    ///
    /// Returns the issue and whether it was created by this call.
    ///
    /// # Errors
    ///
    /// Fails with an unprocessable error when the evaluation result does
    /// not exist in the workspace.
    #[allow(clippy::too_many_arguments)]
    pub fn record_occurrence(
        &mut self,
        workspace_id: &str,
        project_id: &str,
        document_uuid: &str,
        evaluation_result_id: i64,
        title: &str,
        description: &str,
        actor: &str,
        config: &EngineConfig,
    ) -> Result<(Issue, bool)> {
        let workspace = workspace_id.to_string();
        let recent_window = Duration::days(config.recent_window_days);
        let escalation_expiry = Duration::days(config.escalation_expiry_days);
        let threshold = config.escalation_threshold;

        self.mutate("record_occurrence", actor, move |tx, ctx| {
            let occurred_at = fetch_result_time(tx, &workspace, evaluation_result_id)?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM issues
                     WHERE workspace_id = ? AND project_id = ? AND document_uuid = ?
                       AND title = ? AND merged_at IS NULL
                     ORDER BY id
                     LIMIT 1",
                    rusqlite::params![workspace, project_id, document_uuid, title],
                    |row| row.get(0),
                )
                .optional()?;

            let (issue_id, created) = match existing {
                Some(id) => {
                    // Backdated occurrences never rewind the pointer: the
                    // update only applies when this occurrence is newer
                    // than the one last-seen currently points at.
                    tx.execute(
                        "UPDATE issues SET last_seen_result_id = ?, updated_at = ?
                         WHERE workspace_id = ? AND id = ?
                           AND ? > COALESCE(
                                 (SELECT er.created_at FROM evaluation_results er
                                  WHERE er.id = issues.last_seen_result_id), '')",
                        rusqlite::params![
                            evaluation_result_id,
                            to_db_time(occurred_at),
                            workspace,
                            id,
                            to_db_time(occurred_at)
                        ],
                    )?;
                    ctx.record_event(&workspace, id, EventType::OccurrenceRecorded, None);
                    (id, false)
                }
                None => {
                    let uuid = generate_uuid(&workspace, document_uuid, title, occurred_at);
                    tx.execute(
                        "INSERT INTO issues
                             (uuid, workspace_id, project_id, document_uuid, title, description,
                              first_seen_result_id, last_seen_result_id, created_at, updated_at)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        rusqlite::params![
                            uuid,
                            workspace,
                            project_id,
                            document_uuid,
                            title,
                            description,
                            evaluation_result_id,
                            evaluation_result_id,
                            to_db_time(occurred_at),
                            to_db_time(occurred_at),
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    ctx.record_event(
                        &workspace,
                        id,
                        EventType::Created,
                        Some(format!("Created issue: {title}")),
                    );
                    (id, true)
                }
            };

            tx.execute(
                "INSERT INTO issue_evaluation_results
                     (workspace_id, issue_id, evaluation_result_id, created_at)
                 VALUES (?, ?, ?, ?)",
                rusqlite::params![
                    workspace,
                    issue_id,
                    evaluation_result_id,
                    to_db_time(occurred_at)
                ],
            )?;

            // Escalation: recent rate reached the threshold and no live
            // (unexpired) flag is already set.
            let recent =
                recent_occurrence_count(tx, &workspace, issue_id, occurred_at - recent_window)?;
            if recent >= threshold {
                let issue = require_issue_tx(tx, &workspace, issue_id)?;
                let flag_live = issue
                    .escalating_at
                    .is_some_and(|at| occurred_at - at < escalation_expiry);
                if !flag_live {
                    tx.execute(
                        "UPDATE issues SET escalating_at = ? WHERE workspace_id = ? AND id = ?",
                        rusqlite::params![to_db_time(occurred_at), workspace, issue_id],
                    )?;
                    ctx.record_event(
                        &workspace,
                        issue_id,
                        EventType::Escalated,
                        Some(format!("{recent} occurrences in the recent window")),
                    );
                }
            }

            let issue = require_issue_tx(tx, &workspace, issue_id)?;
            Ok((issue, created))
        })
    }
}

fn guard_violation(err: TransitionError) -> EngineError {
    EngineError::unprocessable(err.to_string())
}

/// Overwrite the four lifecycle columns from a state projection.
fn write_state(
    tx: &Transaction<'_>,
    workspace_id: &str,
    issue_id: i64,
    state: IssueState,
    at: DateTime<Utc>,
) -> Result<()> {
    let (resolved_at, ignored_at, merged_at, merged_to_issue_id) = state.to_timestamps();
    tx.execute(
        "UPDATE issues
         SET resolved_at = ?, ignored_at = ?, merged_at = ?, merged_to_issue_id = ?, updated_at = ?
         WHERE workspace_id = ? AND id = ?",
        rusqlite::params![
            resolved_at.map(to_db_time),
            ignored_at.map(to_db_time),
            merged_at.map(to_db_time),
            merged_to_issue_id,
            to_db_time(at),
            workspace_id,
            issue_id
        ],
    )?;
    Ok(())
}

fn fetch_result_time(
    tx: &Transaction<'_>,
    workspace_id: &str,
    evaluation_result_id: i64,
) -> Result<DateTime<Utc>> {
    let created_at: Option<String> = tx
        .query_row(
            "SELECT created_at FROM evaluation_results WHERE workspace_id = ? AND id = ?",
            rusqlite::params![workspace_id, evaluation_result_id],
            |row| row.get(0),
        )
        .optional()?;

    created_at.map(|s| crate::util::parse_datetime(&s)).ok_or_else(|| {
        EngineError::unprocessable(format!(
            "evaluation result {evaluation_result_id} not found in workspace"
        ))
    })
}
