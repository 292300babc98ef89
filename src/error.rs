//! Error types for the issue engine.
//!
//! The taxonomy mirrors what callers need at the request boundary:
//! not-found (404-class), guard violations (422-class), lock contention
//! (422-class, fail-fast), and internal store failures. Guard violations
//! and lock contention are expected and never retried by the engine.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// All errors the engine can surface to a caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The issue does not exist in the requested workspace.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// A lifecycle guard rejected the transition. Carries a
    /// human-readable reason for the caller to surface.
    #[error("Unprocessable: {reason}")]
    Unprocessable { reason: String },

    /// The row lock is held elsewhere and the caller asked not to wait.
    #[error("Issue is locked by another operation, try again")]
    LockUnavailable,

    /// Configuration error (bad file, bad value).
    #[error("Config error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Build a guard-violation error with a formatted reason.
    #[must_use]
    pub fn unprocessable(reason: impl Into<String>) -> Self {
        Self::Unprocessable {
            reason: reason.into(),
        }
    }

    /// The HTTP-ish status class a transport layer should map this to.
    #[must_use]
    pub const fn status_class(&self) -> u16 {
        match self {
            Self::IssueNotFound { .. } => 404,
            Self::Unprocessable { .. } | Self::LockUnavailable => 422,
            Self::Config(_) | Self::Sqlite(_) | Self::Io(_) | Self::Json(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        // SQLITE_BUSY surfaces when a non-waiting writer loses the race
        // for the write lock. That is the engine's lock-contention signal,
        // not an internal fault.
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return Self::LockUnavailable;
            }
        }
        Self::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(
            EngineError::IssueNotFound { id: "7".into() }.status_class(),
            404
        );
        assert_eq!(EngineError::unprocessable("nope").status_class(), 422);
        assert_eq!(EngineError::LockUnavailable.status_class(), 422);
        assert_eq!(EngineError::Config("bad".into()).status_class(), 500);
    }

    #[test]
    fn busy_maps_to_lock_unavailable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(
            EngineError::from(busy),
            EngineError::LockUnavailable
        ));
    }
}
