//! Domain types: issues, derived statistics, evaluation collaborators.
//!
//! # Submodules
//!
//! - [`state`] - The exclusive lifecycle state machine and its guards
//! - [`event`] - Domain events (post-commit) and audit journal entries

pub mod event;
pub mod state;

pub use event::{DomainEvent, DomainEventKind, EventType, IssueEvent, Notifier, TracingNotifier};
pub use state::{IssueState, Transition, TransitionError};

use crate::config::EngineConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The deduplication unit for recurring evaluation failures on one document.
///
/// Never physically deleted; closure is represented by the lifecycle
/// timestamps, which are a projection of [`IssueState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: i64,
    pub uuid: String,
    pub workspace_id: String,
    pub project_id: String,
    pub document_uuid: String,
    pub title: String,
    pub description: String,
    /// Weak reference to the evaluation result that first produced this issue.
    pub first_seen_result_id: Option<i64>,
    /// Weak reference to the evaluation result that most recently did.
    pub last_seen_result_id: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub ignored_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merged_to_issue_id: Option<i64>,
    pub escalating_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// The exclusive lifecycle state implied by the timestamps.
    #[must_use]
    pub fn state(&self) -> IssueState {
        IssueState::from_timestamps(
            self.resolved_at,
            self.ignored_at,
            self.merged_at,
            self.merged_to_issue_id,
        )
    }
}

/// Per-issue occurrence statistics over the visible commit scope.
/// Computed on demand; never cached at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramStats {
    /// Occurrences within the trailing recent window.
    pub recent_count: i64,
    /// All occurrences within the visible scope.
    pub total_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Commit of the occurrence with the maximum timestamp.
    pub last_commit_id: Option<i64>,
}

/// Commit summary attached to a listed issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    pub uuid: String,
    pub title: String,
    pub version: i64,
}

/// Target summary attached to a merged issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedIssueRef {
    pub id: i64,
    pub title: String,
    pub uuid: String,
}

/// Boolean facets derived from state, timestamps and histogram stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFacets {
    pub is_new: bool,
    pub is_resolved: bool,
    pub is_regressed: bool,
    pub is_ignored: bool,
    pub is_escalating: bool,
    pub is_merged: bool,
}

impl IssueFacets {
    /// Derive all facets. `last_seen` is the most recent visible occurrence;
    /// `None` means no occurrence is visible in the requested scope.
    #[must_use]
    pub fn derive(
        issue: &Issue,
        last_seen: Option<DateTime<Utc>>,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let state = issue.state();
        let is_resolved = issue.resolved_at.is_some();
        let is_ignored = issue.ignored_at.is_some();
        let is_regressed = match (issue.resolved_at, issue.ignored_at, last_seen) {
            (Some(resolved_at), None, Some(seen)) => seen > resolved_at,
            _ => false,
        };
        let is_escalating = issue.escalating_at.is_some_and(|at| {
            now - at < Duration::days(config.escalation_expiry_days)
        });
        Self {
            is_new: now - issue.created_at < Duration::days(config.new_issue_window_days),
            is_resolved,
            is_regressed,
            is_ignored,
            is_escalating,
            is_merged: state.is_merged(),
        }
    }
}

/// An issue joined with its derived facets and histogram statistics.
/// This is the persisted wire shape the listing and get operations return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueWithStats {
    #[serde(flatten)]
    pub issue: Issue,
    #[serde(flatten)]
    pub facets: IssueFacets,
    pub recent_count: i64,
    pub total_count: i64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_commit: Option<CommitRef>,
    pub merged_to_issue: Option<MergedIssueRef>,
}

/// Trigger mode of an evaluation version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerMode {
    /// Evaluate only when explicitly requested.
    OnDemand,
    /// Evaluate every new interaction as it arrives.
    #[default]
    EveryInteraction,
}

impl TriggerMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OnDemand => "on_demand",
            Self::EveryInteraction => "every_interaction",
        }
    }
}

impl std::str::FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_demand" => Ok(Self::OnDemand),
            "every_interaction" => Ok(Self::EveryInteraction),
            other => Err(format!("unknown trigger mode: {other}")),
        }
    }
}

/// Evaluation configuration linked to an issue. Owned by the evaluation
/// subsystem; the lifecycle cascades mutate `ignored_at`,
/// `evaluate_live_logs` and `trigger_mode` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationVersion {
    pub id: i64,
    pub workspace_id: String,
    pub issue_id: Option<i64>,
    pub ignored_at: Option<DateTime<Utc>>,
    /// Gate for whether new logs are evaluated automatically.
    pub evaluate_live_logs: bool,
    pub trigger_mode: TriggerMode,
    /// Whether this evaluation supports live evaluation at all. Cascades
    /// leave non-live-capable versions untouched in both directions.
    pub live_capable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(resolved: Option<i64>, ignored: Option<i64>) -> Issue {
        let base = Utc::now() - Duration::days(30);
        Issue {
            id: 1,
            uuid: "u".into(),
            workspace_id: "ws".into(),
            project_id: "p".into(),
            document_uuid: "doc".into(),
            title: "t".into(),
            description: String::new(),
            first_seen_result_id: None,
            last_seen_result_id: None,
            resolved_at: resolved.map(|d| base + Duration::days(d)),
            ignored_at: ignored.map(|d| base + Duration::days(d)),
            merged_at: None,
            merged_to_issue_id: None,
            escalating_at: None,
            created_at: base,
            updated_at: base,
        }
    }

    #[test]
    fn regressed_requires_all_three_conditions() {
        let config = EngineConfig::default();
        let now = Utc::now();
        let resolved_at = issue(Some(2), None).resolved_at.unwrap();
        let after = Some(resolved_at + Duration::days(1));
        let before = Some(resolved_at - Duration::days(1));

        // All three conditions hold.
        assert!(IssueFacets::derive(&issue(Some(2), None), after, &config, now).is_regressed);
        // Not resolved.
        assert!(!IssueFacets::derive(&issue(None, None), after, &config, now).is_regressed);
        // Ignored.
        assert!(!IssueFacets::derive(&issue(Some(2), Some(3)), after, &config, now).is_regressed);
        // Last occurrence predates the resolution.
        assert!(!IssueFacets::derive(&issue(Some(2), None), before, &config, now).is_regressed);
        // No visible occurrence at all.
        assert!(!IssueFacets::derive(&issue(Some(2), None), None, &config, now).is_regressed);
    }

    #[test]
    fn new_facet_uses_configured_window() {
        let now = Utc::now();
        let mut subject = issue(None, None);
        subject.created_at = now - Duration::days(10);
        let narrow = EngineConfig::default();
        assert!(!IssueFacets::derive(&subject, None, &narrow, now).is_new);

        let wide = EngineConfig {
            new_issue_window_days: 14,
            ..EngineConfig::default()
        };
        assert!(IssueFacets::derive(&subject, None, &wide, now).is_new);
    }

    #[test]
    fn escalating_expires() {
        let config = EngineConfig::default();
        let now = Utc::now();
        let mut subject = issue(None, None);
        subject.escalating_at = Some(now - Duration::days(1));
        assert!(IssueFacets::derive(&subject, None, &config, now).is_escalating);

        subject.escalating_at =
            Some(now - Duration::days(config.escalation_expiry_days + 1));
        assert!(!IssueFacets::derive(&subject, None, &config, now).is_escalating);
    }

    #[test]
    fn trigger_mode_round_trips() {
        for mode in [TriggerMode::OnDemand, TriggerMode::EveryInteraction] {
            assert_eq!(mode.as_str().parse::<TriggerMode>(), Ok(mode));
        }
    }
}
