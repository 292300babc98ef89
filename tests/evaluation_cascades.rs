//! Lifecycle cascades into linked evaluation versions.

mod common;

use chrono::Utc;
use common::fixtures::{seed_issue, ACTOR, WS};
use common::test_db;
use issue_engine::model::TriggerMode;
use issue_engine::storage::WaitPolicy;

#[test]
fn resolve_optionally_mutes_linked_evaluations() {
    let mut storage = test_db();
    let (_, issue) = seed_issue(&mut storage, "Cascade resolve", Utc::now());
    let version_id = storage
        .insert_evaluation_version(WS, Some(issue.id), true)
        .unwrap();

    // ignore_evaluations = false leaves the evaluation running.
    storage
        .resolve(WS, issue.id, false, ACTOR, WaitPolicy::Wait)
        .unwrap();
    let version = storage.get_evaluation_version(WS, version_id).unwrap().unwrap();
    assert!(version.evaluate_live_logs);
    assert!(version.ignored_at.is_none());

    storage.unresolve(WS, issue.id, ACTOR, WaitPolicy::Wait).unwrap();

    // ignore_evaluations = true mutes it.
    storage
        .resolve(WS, issue.id, true, ACTOR, WaitPolicy::Wait)
        .unwrap();
    let version = storage.get_evaluation_version(WS, version_id).unwrap().unwrap();
    assert!(!version.evaluate_live_logs);
    assert!(version.ignored_at.is_some());
}

#[test]
fn unresolve_unmutes_and_restores_the_trigger() {
    let mut storage = test_db();
    let (_, issue) = seed_issue(&mut storage, "Cascade unresolve", Utc::now());
    let version_id = storage
        .insert_evaluation_version(WS, Some(issue.id), true)
        .unwrap();

    storage
        .resolve(WS, issue.id, true, ACTOR, WaitPolicy::Wait)
        .unwrap();
    storage.unresolve(WS, issue.id, ACTOR, WaitPolicy::Wait).unwrap();

    let version = storage.get_evaluation_version(WS, version_id).unwrap().unwrap();
    assert!(version.evaluate_live_logs);
    assert!(version.ignored_at.is_none());
    assert_eq!(version.trigger_mode, TriggerMode::EveryInteraction);
}

#[test]
fn ignore_and_unignore_cascade_symmetrically() {
    let mut storage = test_db();
    let (_, issue) = seed_issue(&mut storage, "Cascade ignore", Utc::now());
    let version_id = storage
        .insert_evaluation_version(WS, Some(issue.id), true)
        .unwrap();

    storage.ignore(WS, issue.id, ACTOR, WaitPolicy::Wait).unwrap();
    let version = storage.get_evaluation_version(WS, version_id).unwrap().unwrap();
    assert!(!version.evaluate_live_logs);
    assert!(version.ignored_at.is_some());

    storage.unignore(WS, issue.id, ACTOR, WaitPolicy::Wait).unwrap();
    let version = storage.get_evaluation_version(WS, version_id).unwrap().unwrap();
    assert!(version.evaluate_live_logs);
    assert!(version.ignored_at.is_none());
}

#[test]
fn cascades_skip_non_live_capable_versions() {
    let mut storage = test_db();
    let (_, issue) = seed_issue(&mut storage, "Cascade capability", Utc::now());
    let live = storage
        .insert_evaluation_version(WS, Some(issue.id), true)
        .unwrap();
    let batch_only = storage
        .insert_evaluation_version(WS, Some(issue.id), false)
        .unwrap();

    storage.ignore(WS, issue.id, ACTOR, WaitPolicy::Wait).unwrap();

    let live_version = storage.get_evaluation_version(WS, live).unwrap().unwrap();
    assert!(live_version.ignored_at.is_some());

    // The batch-only version keeps its configuration in both directions.
    let untouched = storage.get_evaluation_version(WS, batch_only).unwrap().unwrap();
    assert!(untouched.ignored_at.is_none());
    assert!(untouched.evaluate_live_logs);

    storage.unignore(WS, issue.id, ACTOR, WaitPolicy::Wait).unwrap();
    let untouched = storage.get_evaluation_version(WS, batch_only).unwrap().unwrap();
    assert!(untouched.ignored_at.is_none());
}

#[test]
fn cascades_only_touch_the_transitioned_issue() {
    let mut storage = test_db();
    let (commit_id, first) = seed_issue(&mut storage, "First", Utc::now());
    let (second, _) = common::fixtures::ingest(
        &mut storage,
        WS,
        commit_id,
        "doc-2",
        "Second",
        Utc::now(),
    );
    let other_version = storage
        .insert_evaluation_version(WS, Some(second.id), true)
        .unwrap();

    storage.ignore(WS, first.id, ACTOR, WaitPolicy::Wait).unwrap();

    let version = storage.get_evaluation_version(WS, other_version).unwrap().unwrap();
    assert!(version.ignored_at.is_none());
    assert!(version.evaluate_live_logs);
}
