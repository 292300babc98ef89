//! Histogram/stats aggregation.
//!
//! Computes per-issue occurrence statistics over a visible commit scope:
//! recent count (trailing window), all-time count, first/last occurrence
//! and the commit of the most recent occurrence. Derived on demand, never
//! cached at rest. This is an inner-join driver: issues with zero matching
//! occurrences in the filtered scope produce no row at all.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::HistogramStats;
use crate::storage::sqlite::{get_datetime, EngineStorage};
use crate::util::{parse_datetime, to_db_time};
use chrono::{DateTime, Duration, Utc};
use rusqlite::ToSql;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Occurrence-level filters, shared between listing and the aggregator.
#[derive(Debug, Clone, Default)]
pub struct StatsFilter {
    /// Restrict occurrences to one document.
    pub document_uuid: Option<String>,
    /// Restrict occurrences to a date window.
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Build the grouped-by-issue histogram subquery and its parameters.
///
/// The caller embeds the SQL as a derived table; parameters must be bound
/// in the returned order before any of the caller's own.
pub(crate) fn histogram_subquery(
    workspace_id: &str,
    commit_ids: &[i64],
    filter: &StatsFilter,
    recent_cutoff: DateTime<Utc>,
) -> (String, Vec<Box<dyn ToSql>>) {
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    // last_commit_id is resolved per row by the window function, so every
    // row of a group carries the same value and the grouped projection is
    // deterministic. Ties on created_at break toward the newer result row.
    let mut sql = String::from(
        "SELECT occ.issue_id AS issue_id,
                COUNT(*) AS total_count,
                SUM(CASE WHEN occ.created_at >= ? THEN 1 ELSE 0 END) AS recent_count,
                MIN(occ.created_at) AS first_seen,
                MAX(occ.created_at) AS last_seen,
                occ.last_commit_id AS last_commit_id
         FROM (
             SELECT ier.issue_id AS issue_id,
                    er.created_at AS created_at,
                    FIRST_VALUE(er.commit_id) OVER (
                        PARTITION BY ier.issue_id
                        ORDER BY er.created_at DESC, er.id DESC
                    ) AS last_commit_id
             FROM issue_evaluation_results ier
             JOIN evaluation_results er ON er.id = ier.evaluation_result_id
             WHERE ier.workspace_id = ?",
    );
    params.push(Box::new(to_db_time(recent_cutoff)));
    params.push(Box::new(workspace_id.to_string()));

    if commit_ids.is_empty() {
        // No visible history means no visible occurrences.
        sql.push_str(" AND 1 = 0");
    } else {
        let placeholders: Vec<String> = commit_ids.iter().map(|_| "?".to_string()).collect();
        let _ = write!(sql, " AND er.commit_id IN ({})", placeholders.join(","));
        for commit_id in commit_ids {
            params.push(Box::new(*commit_id));
        }
    }

    if let Some(ref document_uuid) = filter.document_uuid {
        sql.push_str(" AND er.document_uuid = ?");
        params.push(Box::new(document_uuid.clone()));
    }

    if let Some(date_from) = filter.date_from {
        sql.push_str(" AND er.created_at >= ?");
        params.push(Box::new(to_db_time(date_from)));
    }

    if let Some(date_to) = filter.date_to {
        sql.push_str(" AND er.created_at <= ?");
        params.push(Box::new(to_db_time(date_to)));
    }

    sql.push_str(" ) occ GROUP BY occ.issue_id");

    (sql, params)
}

impl EngineStorage {
    /// Compute histogram statistics for every issue with at least one
    /// visible occurrence in the given commit scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn histogram(
        &self,
        workspace_id: &str,
        commit_ids: &[i64],
        filter: &StatsFilter,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<HashMap<i64, HistogramStats>> {
        let cutoff = now - Duration::days(config.recent_window_days);
        let (sql, params) = histogram_subquery(workspace_id, commit_ids, filter, cutoff);

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            let issue_id: i64 = row.get(0)?;
            Ok((
                issue_id,
                HistogramStats {
                    total_count: row.get(1)?,
                    recent_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    first_seen: parse_datetime(&row.get::<_, String>(3)?),
                    last_seen: parse_datetime(&row.get::<_, String>(4)?),
                    last_commit_id: row.get(5)?,
                },
            ))
        })?;

        let mut stats = HashMap::new();
        for row in rows {
            let (issue_id, entry) = row?;
            stats.insert(issue_id, entry);
        }
        Ok(stats)
    }
}

/// Count an issue's occurrences at or after `cutoff`, across all commits.
/// Used by ingestion to detect escalation.
pub(crate) fn recent_occurrence_count(
    conn: &rusqlite::Connection,
    workspace_id: &str,
    issue_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<i64> {
    let count = conn.query_row(
        "SELECT count(*)
         FROM issue_evaluation_results ier
         JOIN evaluation_results er ON er.id = ier.evaluation_result_id
         WHERE ier.workspace_id = ? AND ier.issue_id = ? AND er.created_at >= ?",
        rusqlite::params![workspace_id, issue_id, to_db_time(cutoff)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Fetch histogram stats for a single issue, or `None` when it has no
/// visible occurrence. Used by the single-issue get, which unlike listing
/// does not drop stat-less issues.
pub(crate) fn histogram_for_issue(
    storage: &EngineStorage,
    workspace_id: &str,
    issue_id: i64,
    commit_ids: &[i64],
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Option<HistogramStats>> {
    let cutoff = now - Duration::days(config.recent_window_days);
    let (subquery, mut params) =
        histogram_subquery(workspace_id, commit_ids, &StatsFilter::default(), cutoff);
    let sql = format!("SELECT * FROM ({subquery}) s WHERE s.issue_id = ?");
    params.push(Box::new(issue_id));

    let params_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
    let mut stmt = storage.conn.prepare(&sql)?;
    let mut rows = stmt.query(params_refs.as_slice())?;

    match rows.next()? {
        Some(row) => Ok(Some(HistogramStats {
            total_count: row.get(1)?,
            recent_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            first_seen: get_datetime(row, 3)?.unwrap_or_else(Utc::now),
            last_seen: get_datetime(row, 4)?.unwrap_or_else(Utc::now),
            last_commit_id: row.get(5)?,
        })),
        None => Ok(None),
    }
}
