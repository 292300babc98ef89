//! Small shared helpers: timestamp formatting and id generation.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use sha2::{Digest, Sha256};

/// Format a timestamp for storage.
///
/// Always UTC, always microsecond precision, always the `Z` suffix, so
/// stored values compare correctly as strings in SQL.
#[must_use]
pub fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, tolerating RFC 3339 and the bare
/// `YYYY-MM-DD HH:MM:SS` form SQLite's `CURRENT_TIMESTAMP` emits.
#[must_use]
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }

    Utc::now()
}

/// Generate a short content-derived identifier for a new issue.
///
/// Hashes the identifying tuple plus the creation time so concurrent
/// creations on the same document never collide in practice.
#[must_use]
pub fn generate_uuid(workspace_id: &str, document_uuid: &str, title: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workspace_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(document_uuid.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(title.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(to_db_time(at).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in &digest[..16] {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
