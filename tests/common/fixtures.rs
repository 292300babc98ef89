//! Seed helpers shared by the integration tests.
//!
//! All helpers default to workspace `ws`, project `proj` and actor
//! `tester@example.com`; tenancy tests pass their own workspace.

use chrono::{DateTime, TimeZone, Utc};
use issue_engine::config::EngineConfig;
use issue_engine::model::Issue;
use issue_engine::storage::EngineStorage;

pub const WS: &str = "ws";
pub const PROJECT: &str = "proj";
pub const ACTOR: &str = "tester@example.com";

/// A fixed anchor, comfortably outside every rolling window, so tests
/// reason about history deterministically.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn seed_commit(storage: &mut EngineStorage, ws: &str, version: i64) -> i64 {
    storage
        .insert_commit(ws, &format!("{ws}-commit-{version}"), "Test commit", version)
        .expect("Failed to insert commit")
}

pub fn seed_document(storage: &mut EngineStorage, ws: &str, commit_id: i64, doc: &str) {
    storage
        .insert_document_version(ws, commit_id, doc)
        .expect("Failed to insert document version");
}

pub fn seed_result(
    storage: &mut EngineStorage,
    ws: &str,
    commit_id: i64,
    doc: &str,
    at: DateTime<Utc>,
) -> i64 {
    storage
        .insert_evaluation_result(ws, commit_id, doc, at)
        .expect("Failed to insert evaluation result")
}

/// Record one occurrence of `title` on `doc`, backed by a fresh
/// evaluation result at `at`. Registers the document in the commit.
pub fn ingest(
    storage: &mut EngineStorage,
    ws: &str,
    commit_id: i64,
    doc: &str,
    title: &str,
    at: DateTime<Utc>,
) -> (Issue, bool) {
    seed_document(storage, ws, commit_id, doc);
    let result_id = seed_result(storage, ws, commit_id, doc, at);
    storage
        .record_occurrence(
            ws,
            PROJECT,
            doc,
            result_id,
            title,
            "seeded occurrence",
            ACTOR,
            &EngineConfig::default(),
        )
        .expect("Failed to record occurrence")
}

/// One commit plus one issue with a single occurrence at `at`.
pub fn seed_issue(storage: &mut EngineStorage, title: &str, at: DateTime<Utc>) -> (i64, Issue) {
    let commit_id = seed_commit(storage, WS, 1);
    let (issue, created) = ingest(storage, WS, commit_id, "doc-1", title, at);
    assert!(created, "expected a fresh issue");
    (commit_id, issue)
}
