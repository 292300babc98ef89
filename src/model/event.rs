//! Domain events and the audit journal types.
//!
//! Two distinct event notions live here:
//!
//! - [`DomainEvent`] — emitted to an external notification sink *after* the
//!   transaction commits (at-least-once; the sink must be idempotent on
//!   `(kind, issue_id)`).
//! - [`IssueEvent`] — an audit row written *inside* the transaction, so the
//!   journal can never disagree with the state it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a domain event delivered to the external notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainEventKind {
    IssueResolved,
    IssueUnresolved,
    IssueIgnored,
    IssueUnignored,
}

impl DomainEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IssueResolved => "issueResolved",
            Self::IssueUnresolved => "issueUnresolved",
            Self::IssueIgnored => "issueIgnored",
            Self::IssueUnignored => "issueUnignored",
        }
    }
}

/// Payload handed to the external notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub kind: DomainEventKind,
    pub workspace_id: String,
    pub issue_id: i64,
    pub user_email: String,
}

/// External notification sink. Delivery is at-least-once; implementations
/// must be idempotent on `(kind, issue_id)`.
pub trait Notifier {
    fn notify(&self, event: &DomainEvent);
}

/// Default sink that records events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &DomainEvent) {
        tracing::info!(
            kind = event.kind.as_str(),
            workspace_id = %event.workspace_id,
            issue_id = event.issue_id,
            user_email = %event.user_email,
            "domain event"
        );
    }
}

/// Type of an audit journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Created,
    OccurrenceRecorded,
    Resolved,
    Unresolved,
    Ignored,
    Unignored,
    Merged,
    Escalated,
}

impl EventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::OccurrenceRecorded => "occurrence_recorded",
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::Ignored => "ignored",
            Self::Unignored => "unignored",
            Self::Merged => "merged",
            Self::Escalated => "escalated",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "occurrence_recorded" => Ok(Self::OccurrenceRecorded),
            "resolved" => Ok(Self::Resolved),
            "unresolved" => Ok(Self::Unresolved),
            "ignored" => Ok(Self::Ignored),
            "unignored" => Ok(Self::Unignored),
            "merged" => Ok(Self::Merged),
            "escalated" => Ok(Self::Escalated),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// One audit journal row, written inside the mutation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueEvent {
    pub id: i64,
    pub workspace_id: String,
    pub issue_id: i64,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
