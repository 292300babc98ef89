//! Classification and listing.
//!
//! Turns lifecycle timestamps plus histogram stats into boolean facets and
//! named status groups, and implements the filtered, sorted, paginated
//! listing. Listing joins issues against the histogram subquery, so only
//! issues with at least one visible occurrence appear; the single-issue
//! get does not drop stat-less issues.

use crate::config::EngineConfig;
use crate::engine::stats::{histogram_for_issue, histogram_subquery, StatsFilter};
use crate::error::Result;
use crate::model::{CommitRef, HistogramStats, IssueFacets, IssueWithStats, MergedIssueRef};
use crate::storage::sqlite::{issue_columns, issue_from_row, EngineStorage};
use crate::util::parse_datetime;
use chrono::{DateTime, Duration, Utc};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Regression in SQL terms: resolved, not ignored, and reoccurred since
/// the resolution timestamp. `s` is the histogram subquery alias.
const REGRESSED_SQL: &str =
    "(i.resolved_at IS NOT NULL AND i.ignored_at IS NULL AND s.last_seen > i.resolved_at)";

/// Named status groups used as a single listing predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusGroup {
    /// Open or regressed, and not merged.
    Active,
    /// Ignored, resolved without regression, or merged.
    Inactive,
    /// Active plus resolved (regressed or not), still excluding ignored
    /// and merged.
    ActiveWithResolved,
}

impl StatusGroup {
    fn predicate(self) -> String {
        match self {
            Self::Active => format!(
                "(((i.resolved_at IS NULL AND i.ignored_at IS NULL) OR {REGRESSED_SQL}) \
                 AND i.merged_at IS NULL)"
            ),
            Self::Inactive => format!(
                "(i.ignored_at IS NOT NULL \
                 OR (i.resolved_at IS NOT NULL AND NOT {REGRESSED_SQL}) \
                 OR i.merged_at IS NOT NULL)"
            ),
            Self::ActiveWithResolved => {
                "(((i.resolved_at IS NULL AND i.ignored_at IS NULL) OR i.resolved_at IS NOT NULL) \
                 AND i.ignored_at IS NULL AND i.merged_at IS NULL)"
                    .to_string()
            }
        }
    }
}

/// Sortable listing columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    LastSeen,
    FirstSeen,
    RecentCount,
    TotalCount,
    CreatedAt,
}

impl SortField {
    const fn column(self) -> &'static str {
        match self {
            Self::LastSeen => "s.last_seen",
            Self::FirstSeen => "s.first_seen",
            Self::RecentCount => "s.recent_count",
            Self::TotalCount => "s.total_count",
            Self::CreatedAt => "i.created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Requested sort. The engine always appends `last_seen DESC, id ASC`
/// tie-breakers so pagination stays stable when the primary key ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Listing filters. `document_uuid`, `date_from` and `date_to` also
/// restrict which occurrences the histogram counts.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub document_uuid: Option<String>,
    /// Case-insensitive substring match on the issue title.
    pub query: Option<String>,
    pub status: Option<StatusGroup>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Full listing request.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub filters: ListFilters,
    pub sort: Sort,
    /// 1-based page number; 0 is treated as 1.
    pub page: u32,
    /// Page size; 0 falls back to the default of 25.
    pub limit: u32,
    /// Classification reference time; defaults to now. Lets callers
    /// evaluate windows against a fixed instant.
    pub as_of: Option<DateTime<Utc>>,
}

const DEFAULT_PAGE_SIZE: u32 = 25;

impl EngineStorage {
    /// List issues for a project over the visible commit history.
    ///
    /// Returns the requested page and the total row count for the filter
    /// set. Only issues whose document exists in the visible history and
    /// which have at least one visible occurrence are eligible.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_issues(
        &self,
        workspace_id: &str,
        project_id: &str,
        commit_ids: &[i64],
        config: &EngineConfig,
        params: &ListParams,
    ) -> Result<(Vec<IssueWithStats>, u64)> {
        let now = params.as_of.unwrap_or_else(Utc::now);
        let stats_filter = StatsFilter {
            document_uuid: params.filters.document_uuid.clone(),
            date_from: params.filters.date_from,
            date_to: params.filters.date_to,
        };
        let cutoff = now - Duration::days(config.recent_window_days);
        let (subquery, subquery_params) =
            histogram_subquery(workspace_id, commit_ids, &stats_filter, cutoff);

        let (where_sql, where_params) =
            self.build_where(workspace_id, project_id, commit_ids, &params.filters);

        let from_sql = format!(
            "FROM issues i
             JOIN ({subquery}) s ON s.issue_id = i.id
             LEFT JOIN commits c ON c.id = s.last_commit_id
             LEFT JOIN issues m ON m.id = i.merged_to_issue_id
             {where_sql}"
        );

        // Total count over the same scope, before pagination.
        let count_sql = format!("SELECT count(*) {from_sql}");
        let mut count_params: Vec<&dyn ToSql> = Vec::new();
        for p in &subquery_params {
            count_params.push(p.as_ref());
        }
        for p in &where_params {
            count_params.push(p.as_ref());
        }
        let total: i64 = self
            .conn
            .query_row(&count_sql, count_params.as_slice(), |row| row.get(0))?;

        let limit = if params.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            params.limit
        };
        let page = params.page.max(1);
        let offset = u64::from(page - 1) * u64::from(limit);

        let mut sql = format!(
            "SELECT {issue_cols},
                    s.recent_count, s.total_count, s.first_seen, s.last_seen, s.last_commit_id,
                    c.uuid, c.title, c.version,
                    m.id, m.title, m.uuid
             {from_sql}",
            issue_cols = issue_columns("i"),
        );
        let _ = write!(
            sql,
            " ORDER BY {} {}, s.last_seen DESC, i.id ASC LIMIT {limit} OFFSET {offset}",
            params.sort.field.column(),
            params.sort.direction.keyword(),
        );

        let mut all_params: Vec<&dyn ToSql> = Vec::new();
        for p in &subquery_params {
            all_params.push(p.as_ref());
        }
        for p in &where_params {
            all_params.push(p.as_ref());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(all_params.as_slice(), |row| {
            let issue = issue_from_row(row)?;
            let stats = HistogramStats {
                recent_count: row.get::<_, Option<i64>>(16)?.unwrap_or(0),
                total_count: row.get(17)?,
                first_seen: parse_datetime(&row.get::<_, String>(18)?),
                last_seen: parse_datetime(&row.get::<_, String>(19)?),
                last_commit_id: row.get(20)?,
            };
            let last_commit = row
                .get::<_, Option<String>>(21)?
                .map(|uuid| -> rusqlite::Result<CommitRef> {
                    Ok(CommitRef {
                        uuid,
                        title: row.get::<_, Option<String>>(22)?.unwrap_or_default(),
                        version: row.get::<_, Option<i64>>(23)?.unwrap_or(0),
                    })
                })
                .transpose()?;
            let merged_to_issue = row
                .get::<_, Option<i64>>(24)?
                .map(|id| -> rusqlite::Result<MergedIssueRef> {
                    Ok(MergedIssueRef {
                        id,
                        title: row.get::<_, Option<String>>(25)?.unwrap_or_default(),
                        uuid: row.get::<_, Option<String>>(26)?.unwrap_or_default(),
                    })
                })
                .transpose()?;
            Ok((issue, stats, last_commit, merged_to_issue))
        })?;

        let mut issues = Vec::new();
        for row in rows {
            let (issue, stats, last_commit, merged_to_issue) = row?;
            let facets = IssueFacets::derive(&issue, Some(stats.last_seen), config, now);
            issues.push(IssueWithStats {
                issue,
                facets,
                recent_count: stats.recent_count,
                total_count: stats.total_count,
                first_seen: Some(stats.first_seen),
                last_seen: Some(stats.last_seen),
                last_commit,
                merged_to_issue,
            });
        }

        Ok((issues, u64::try_from(total).unwrap_or(0)))
    }

    /// Fetch one issue with stats and facets over the visible history.
    ///
    /// Unlike listing, an issue without visible occurrences is still
    /// returned, with zeroed counts and no last commit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::IssueNotFound`] when the issue
    /// is absent in the tenant scope.
    pub fn get_issue_with_stats(
        &self,
        workspace_id: &str,
        issue_id: i64,
        commit_ids: &[i64],
        config: &EngineConfig,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<IssueWithStats> {
        let now = as_of.unwrap_or_else(Utc::now);
        let issue = self.require_issue(workspace_id, issue_id)?;
        let stats =
            histogram_for_issue(self, workspace_id, issue_id, commit_ids, config, now)?;

        let last_commit = match stats.as_ref().and_then(|s| s.last_commit_id) {
            Some(commit_id) => self.commit_ref(workspace_id, commit_id)?,
            None => None,
        };
        let merged_to_issue = match issue.merged_to_issue_id {
            Some(target_id) => self
                .get_issue(workspace_id, target_id)?
                .map(|target| MergedIssueRef {
                    id: target.id,
                    title: target.title,
                    uuid: target.uuid,
                }),
            None => None,
        };

        let facets =
            IssueFacets::derive(&issue, stats.as_ref().map(|s| s.last_seen), config, now);
        Ok(IssueWithStats {
            issue,
            facets,
            recent_count: stats.as_ref().map_or(0, |s| s.recent_count),
            total_count: stats.as_ref().map_or(0, |s| s.total_count),
            first_seen: stats.as_ref().map(|s| s.first_seen),
            last_seen: stats.as_ref().map(|s| s.last_seen),
            last_commit,
            merged_to_issue,
        })
    }

    fn commit_ref(&self, workspace_id: &str, commit_id: i64) -> Result<Option<CommitRef>> {
        use rusqlite::OptionalExtension as _;

        let commit = self
            .conn
            .query_row(
                "SELECT uuid, title, version FROM commits WHERE workspace_id = ? AND id = ?",
                rusqlite::params![workspace_id, commit_id],
                |row| {
                    Ok(CommitRef {
                        uuid: row.get(0)?,
                        title: row.get(1)?,
                        version: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(commit)
    }

    #[allow(clippy::unused_self)]
    fn build_where(
        &self,
        workspace_id: &str,
        project_id: &str,
        commit_ids: &[i64],
        filters: &ListFilters,
    ) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = String::from("WHERE i.workspace_id = ? AND i.project_id = ?");
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(workspace_id.to_string()),
            Box::new(project_id.to_string()),
        ];

        // Document must exist in the visible commit history.
        if commit_ids.is_empty() {
            sql.push_str(" AND 1 = 0");
        } else {
            let placeholders: Vec<String> = commit_ids.iter().map(|_| "?".to_string()).collect();
            let _ = write!(
                sql,
                " AND i.document_uuid IN (
                       SELECT dv.document_uuid FROM document_versions dv
                       WHERE dv.workspace_id = ? AND dv.commit_id IN ({}))",
                placeholders.join(",")
            );
            params.push(Box::new(workspace_id.to_string()));
            for commit_id in commit_ids {
                params.push(Box::new(*commit_id));
            }
        }

        if let Some(ref document_uuid) = filters.document_uuid {
            sql.push_str(" AND i.document_uuid = ?");
            params.push(Box::new(document_uuid.clone()));
        }

        if let Some(ref query) = filters.query {
            let trimmed = query.trim();
            if !trimmed.is_empty() {
                sql.push_str(" AND LOWER(i.title) LIKE LOWER(?)");
                params.push(Box::new(format!("%{trimmed}%")));
            }
        }

        if let Some(status) = filters.status {
            let _ = write!(sql, " AND {}", status.predicate());
        }

        (sql, params)
    }
}
