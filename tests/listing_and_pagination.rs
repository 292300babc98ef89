//! Listing: filtering, status groups, sorting, pagination, facets.

mod common;

use chrono::{Duration, Utc};
use common::fixtures::{ingest, seed_commit, t0, ACTOR, PROJECT, WS};
use common::test_db;
use issue_engine::config::EngineConfig;
use issue_engine::engine::{ListFilters, ListParams, Sort, SortDirection, SortField, StatusGroup};
use issue_engine::model::Transition;
use issue_engine::storage::WaitPolicy;

fn params() -> ListParams {
    ListParams {
        limit: 50,
        ..ListParams::default()
    }
}

#[test]
fn listing_requires_a_visible_occurrence() {
    let mut storage = test_db();
    let visible = seed_commit(&mut storage, WS, 1);
    let hidden = seed_commit(&mut storage, WS, 2);
    let config = EngineConfig::default();

    let (shown, _) = ingest(&mut storage, WS, visible, "doc-1", "Visible", t0());
    let (dropped, _) = ingest(&mut storage, WS, hidden, "doc-2", "Hidden", t0());

    let (issues, total) = storage
        .list_issues(WS, PROJECT, &[visible], &config, &params())
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue.id, shown.id);

    // The single-issue get does not drop stat-less issues; it reports
    // zeroed counts instead.
    let got = storage
        .get_issue_with_stats(WS, dropped.id, &[visible], &config, None)
        .unwrap();
    assert_eq!(got.total_count, 0);
    assert!(got.last_seen.is_none());
    assert!(got.last_commit.is_none());
}

#[test]
fn regression_reactivates_a_resolved_issue() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();
    let now = Utc::now();

    let (issue, _) = ingest(
        &mut storage,
        WS,
        commit_id,
        "doc-1",
        "Regression",
        now - Duration::days(10),
    );
    storage
        .transition_at(
            WS,
            issue.id,
            Transition::Resolve {
                ignore_evaluations: false,
            },
            ACTOR,
            WaitPolicy::Wait,
            now - Duration::days(5),
        )
        .unwrap();

    // Resolved and quiet: inactive.
    let mut inactive = params();
    inactive.filters.status = Some(StatusGroup::Inactive);
    let (issues, _) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &inactive)
        .unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].facets.is_resolved);
    assert!(!issues[0].facets.is_regressed);

    // It reoccurs after the resolution: regressed, back in active.
    ingest(
        &mut storage,
        WS,
        commit_id,
        "doc-1",
        "Regression",
        now - Duration::days(2),
    );
    let mut active = params();
    active.filters.status = Some(StatusGroup::Active);
    let (issues, _) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &active)
        .unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].facets.is_resolved);
    assert!(issues[0].facets.is_regressed);
    assert!(!issues[0].facets.is_new);

    let (issues, _) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &inactive)
        .unwrap();
    assert!(issues.is_empty());
}

#[test]
fn status_groups_partition_the_population() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();

    let (open, _) = ingest(&mut storage, WS, commit_id, "doc-1", "Open", t0());
    let (resolved, _) = ingest(&mut storage, WS, commit_id, "doc-2", "Resolved", t0());
    let (ignored, _) = ingest(&mut storage, WS, commit_id, "doc-3", "Ignored", t0());
    let (merged, _) = ingest(&mut storage, WS, commit_id, "doc-4", "Merged away", t0());

    storage
        .resolve(WS, resolved.id, false, ACTOR, WaitPolicy::Wait)
        .unwrap();
    storage
        .ignore(WS, ignored.id, ACTOR, WaitPolicy::Wait)
        .unwrap();
    storage
        .merge(WS, merged.id, open.id, ACTOR, WaitPolicy::Wait)
        .unwrap();

    let list = |status: Option<StatusGroup>| {
        let mut p = params();
        p.filters.status = status;
        let (issues, _) = storage
            .list_issues(WS, PROJECT, &[commit_id], &config, &p)
            .unwrap();
        let mut ids: Vec<i64> = issues.iter().map(|i| i.issue.id).collect();
        ids.sort_unstable();
        ids
    };

    assert_eq!(list(None).len(), 4);
    assert_eq!(list(Some(StatusGroup::Active)), vec![open.id]);
    assert_eq!(
        list(Some(StatusGroup::Inactive)),
        vec![resolved.id, ignored.id, merged.id]
    );
    assert_eq!(
        list(Some(StatusGroup::ActiveWithResolved)),
        vec![open.id, resolved.id]
    );
}

#[test]
fn merged_issues_carry_their_target() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();

    let (source, _) = ingest(&mut storage, WS, commit_id, "doc-1", "Source", t0());
    let (target, _) = ingest(&mut storage, WS, commit_id, "doc-2", "Target", t0());
    storage
        .merge(WS, source.id, target.id, ACTOR, WaitPolicy::Wait)
        .unwrap();

    let got = storage
        .get_issue_with_stats(WS, source.id, &[commit_id], &config, None)
        .unwrap();
    assert!(got.facets.is_merged);
    let merged_to = got.merged_to_issue.expect("target summary expected");
    assert_eq!(merged_to.id, target.id);
    assert_eq!(merged_to.title, "Target");
}

#[test]
fn title_search_is_case_insensitive() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();

    ingest(&mut storage, WS, commit_id, "doc-1", "Timeout in Checkout", t0());
    ingest(&mut storage, WS, commit_id, "doc-2", "Crash on startup", t0());

    let mut p = params();
    p.filters.query = Some("CHECKOUT".to_string());
    let (issues, total) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &p)
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(issues[0].issue.title, "Timeout in Checkout");
}

#[test]
fn sorting_and_tie_breaks_are_stable() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();

    // "Busy" gets three occurrences, "Quiet" one; both share last_seen.
    let last = t0() + Duration::days(3);
    ingest(&mut storage, WS, commit_id, "doc-1", "Busy", t0());
    ingest(&mut storage, WS, commit_id, "doc-1", "Busy", t0() + Duration::days(1));
    ingest(&mut storage, WS, commit_id, "doc-1", "Busy", last);
    ingest(&mut storage, WS, commit_id, "doc-2", "Quiet", last);

    let mut p = params();
    p.sort = Sort {
        field: SortField::TotalCount,
        direction: SortDirection::Desc,
    };
    let (issues, _) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &p)
        .unwrap();
    assert_eq!(issues[0].issue.title, "Busy");
    assert_eq!(issues[0].total_count, 3);
    assert_eq!(issues[1].issue.title, "Quiet");

    // Equal primary key: the lower id wins via the trailing tie-break.
    p.sort = Sort {
        field: SortField::LastSeen,
        direction: SortDirection::Desc,
    };
    let (issues, _) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &p)
        .unwrap();
    assert_eq!(issues[0].issue.title, "Busy");
}

#[test]
fn pagination_pages_through_without_overlap() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();

    for n in 0..5 {
        ingest(
            &mut storage,
            WS,
            commit_id,
            &format!("doc-{n}"),
            &format!("Issue {n}"),
            t0() + Duration::hours(n),
        );
    }

    let mut p = params();
    p.limit = 2;
    let mut seen = Vec::new();
    for page in 1..=3 {
        p.page = page;
        let (issues, total) = storage
            .list_issues(WS, PROJECT, &[commit_id], &config, &p)
            .unwrap();
        assert_eq!(total, 5);
        seen.extend(issues.iter().map(|i| i.issue.id));
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[test]
fn listing_reports_the_last_commit() {
    let mut storage = test_db();
    let first = seed_commit(&mut storage, WS, 1);
    let second = seed_commit(&mut storage, WS, 2);
    let config = EngineConfig::default();

    ingest(&mut storage, WS, first, "doc-1", "Moving", t0());
    ingest(&mut storage, WS, second, "doc-1", "Moving", t0() + Duration::days(1));

    let (issues, _) = storage
        .list_issues(WS, PROJECT, &[first, second], &config, &params())
        .unwrap();
    let last_commit = issues[0].last_commit.as_ref().expect("commit expected");
    assert_eq!(last_commit.version, 2);
}

#[test]
fn date_filters_narrow_both_stats_and_listing() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    let config = EngineConfig::default();

    ingest(&mut storage, WS, commit_id, "doc-1", "Early", t0());
    ingest(
        &mut storage,
        WS,
        commit_id,
        "doc-2",
        "Late",
        t0() + Duration::days(10),
    );

    let mut p = params();
    p.filters = ListFilters {
        date_from: Some(t0() + Duration::days(5)),
        ..ListFilters::default()
    };
    let (issues, total) = storage
        .list_issues(WS, PROJECT, &[commit_id], &config, &p)
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(issues[0].issue.title, "Late");
}

#[test]
fn empty_commit_scope_lists_nothing() {
    let mut storage = test_db();
    let commit_id = seed_commit(&mut storage, WS, 1);
    ingest(&mut storage, WS, commit_id, "doc-1", "Orphan", t0());

    let (issues, total) = storage
        .list_issues(WS, PROJECT, &[], &EngineConfig::default(), &params())
        .unwrap();
    assert_eq!(total, 0);
    assert!(issues.is_empty());
}
