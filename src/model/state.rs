//! The issue state machine.
//!
//! Status is modeled as a sum type rather than independent nullable
//! timestamps, so an issue cannot be simultaneously resolved and ignored
//! and a merged issue cannot be transitioned at all. The persisted
//! timestamps are a projection of this type; [`IssueState::from_timestamps`]
//! is the single place that interprets them.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Exclusive lifecycle state of an issue. Regressed, escalating and new
/// are orthogonal derived facets, not states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    /// Open and actionable.
    Active,
    /// Marked resolved at the given time.
    Resolved { at: DateTime<Utc> },
    /// Muted at the given time.
    Ignored { at: DateTime<Utc> },
    /// Folded into another issue. Terminal.
    Merged {
        at: DateTime<Utc>,
        target: i64,
    },
}

/// Why a transition was rejected. Converts into the engine's
/// unprocessable-entity error at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("issue is already resolved")]
    AlreadyResolved,
    #[error("issue is already ignored")]
    AlreadyIgnored,
    #[error("issue is not resolved")]
    NotResolved,
    #[error("issue is not ignored")]
    NotIgnored,
    #[error("cannot resolve an ignored issue, unignore it first")]
    IgnoredCannotResolve,
    #[error("cannot ignore a resolved issue")]
    ResolvedCannotIgnore,
    #[error("cannot unresolve an ignored issue")]
    IgnoredCannotUnresolve,
    #[error("cannot unignore a resolved issue")]
    ResolvedCannotUnignore,
    #[error("issue has been merged and is no longer actionable")]
    Merged,
    #[error("cannot merge an issue into itself")]
    MergeIntoSelf,
    #[error("merge target has itself been merged")]
    TargetMerged,
}

impl IssueState {
    /// Reconstruct the state from persisted timestamps. Merged wins over
    /// everything; the resolved/ignored pair is mutually exclusive by
    /// construction of the transitions, but merged-precedence also makes
    /// legacy rows with both set readable (ignored wins, matching the
    /// listing predicates which treat ignored as inactive regardless).
    #[must_use]
    pub fn from_timestamps(
        resolved_at: Option<DateTime<Utc>>,
        ignored_at: Option<DateTime<Utc>>,
        merged_at: Option<DateTime<Utc>>,
        merged_to_issue_id: Option<i64>,
    ) -> Self {
        if let (Some(at), Some(target)) = (merged_at, merged_to_issue_id) {
            return Self::Merged { at, target };
        }
        if let Some(at) = ignored_at {
            return Self::Ignored { at };
        }
        if let Some(at) = resolved_at {
            return Self::Resolved { at };
        }
        Self::Active
    }

    /// Mark resolved. Fails on resolved, ignored, and merged issues.
    pub fn resolve(self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        match self {
            Self::Active => Ok(Self::Resolved { at: now }),
            Self::Resolved { .. } => Err(TransitionError::AlreadyResolved),
            Self::Ignored { .. } => Err(TransitionError::IgnoredCannotResolve),
            Self::Merged { .. } => Err(TransitionError::Merged),
        }
    }

    /// Clear the resolved mark. Fails unless currently resolved.
    pub fn unresolve(self) -> Result<Self, TransitionError> {
        match self {
            Self::Resolved { .. } => Ok(Self::Active),
            Self::Active => Err(TransitionError::NotResolved),
            Self::Ignored { .. } => Err(TransitionError::IgnoredCannotUnresolve),
            Self::Merged { .. } => Err(TransitionError::Merged),
        }
    }

    /// Mute the issue. Fails on resolved, ignored, and merged issues.
    pub fn ignore(self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        match self {
            Self::Active => Ok(Self::Ignored { at: now }),
            Self::Resolved { .. } => Err(TransitionError::ResolvedCannotIgnore),
            Self::Ignored { .. } => Err(TransitionError::AlreadyIgnored),
            Self::Merged { .. } => Err(TransitionError::Merged),
        }
    }

    /// Unmute the issue. Fails unless currently ignored.
    pub fn unignore(self) -> Result<Self, TransitionError> {
        match self {
            Self::Ignored { .. } => Ok(Self::Active),
            Self::Resolved { .. } => Err(TransitionError::ResolvedCannotUnignore),
            Self::Active => Err(TransitionError::NotIgnored),
            Self::Merged { .. } => Err(TransitionError::Merged),
        }
    }

    /// Fold into `target`. Terminal; fails on already-merged issues.
    pub fn merge(self, now: DateTime<Utc>, target: i64) -> Result<Self, TransitionError> {
        match self {
            Self::Merged { .. } => Err(TransitionError::Merged),
            _ => Ok(Self::Merged { at: now, target }),
        }
    }

    #[must_use]
    pub const fn is_merged(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }

    /// Project the state back into the four persisted columns:
    /// `(resolved_at, ignored_at, merged_at, merged_to_issue_id)`.
    #[must_use]
    pub const fn to_timestamps(
        &self,
    ) -> (
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
        Option<i64>,
    ) {
        match *self {
            Self::Active => (None, None, None, None),
            Self::Resolved { at } => (Some(at), None, None, None),
            Self::Ignored { at } => (None, Some(at), None, None),
            Self::Merged { at, target } => (None, None, Some(at), Some(target)),
        }
    }
}

/// A requested lifecycle transition, used by the lifecycle service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Resolve { ignore_evaluations: bool },
    Unresolve,
    Ignore,
    Unignore,
}
