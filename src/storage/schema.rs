//! Database schema definitions and migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the issue engine database.
///
/// Every tenant-scoped table carries `workspace_id` and every index that
/// backs a query path leads with it.
pub const SCHEMA_SQL: &str = r"
    -- Issues: the deduplication unit for recurring evaluation failures.
    -- Lifecycle timestamps are a projection of the state machine; the CHECK
    -- constraints encode what the transitions already guarantee.
    CREATE TABLE IF NOT EXISTS issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL UNIQUE,
        workspace_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        document_uuid TEXT NOT NULL,
        title TEXT NOT NULL CHECK(length(title) <= 500),
        description TEXT NOT NULL DEFAULT '',
        first_seen_result_id INTEGER,
        last_seen_result_id INTEGER,
        resolved_at DATETIME,
        ignored_at DATETIME,
        merged_at DATETIME,
        merged_to_issue_id INTEGER,
        escalating_at DATETIME,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        -- merged_at and merged_to_issue_id are set together
        CHECK ((merged_at IS NULL) = (merged_to_issue_id IS NULL)),
        -- resolved and ignored are mutually exclusive
        CHECK (resolved_at IS NULL OR ignored_at IS NULL)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_workspace_project
        ON issues(workspace_id, project_id);
    CREATE INDEX IF NOT EXISTS idx_issues_workspace_document
        ON issues(workspace_id, document_uuid);
    CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at);
    CREATE INDEX IF NOT EXISTS idx_issues_merged
        ON issues(workspace_id, merged_at) WHERE merged_at IS NOT NULL;

    -- Commits: visible-history scope and lastCommit metadata.
    CREATE TABLE IF NOT EXISTS commits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workspace_id TEXT NOT NULL,
        uuid TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL DEFAULT '',
        version INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_commits_workspace ON commits(workspace_id);

    -- Document versions: which documents exist in which commit. Listing
    -- only surfaces issues whose document is visible in the requested
    -- commit history.
    CREATE TABLE IF NOT EXISTS document_versions (
        workspace_id TEXT NOT NULL,
        commit_id INTEGER NOT NULL,
        document_uuid TEXT NOT NULL,
        PRIMARY KEY (workspace_id, commit_id, document_uuid),
        FOREIGN KEY (commit_id) REFERENCES commits(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_document_versions_document
        ON document_versions(workspace_id, document_uuid);

    -- Evaluation results: the occurrence source the aggregator joins against.
    CREATE TABLE IF NOT EXISTS evaluation_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workspace_id TEXT NOT NULL,
        commit_id INTEGER NOT NULL,
        document_uuid TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        FOREIGN KEY (commit_id) REFERENCES commits(id)
    );
    CREATE INDEX IF NOT EXISTS idx_evaluation_results_commit
        ON evaluation_results(workspace_id, commit_id);
    CREATE INDEX IF NOT EXISTS idx_evaluation_results_created_at
        ON evaluation_results(created_at);

    -- Issue/evaluation-result associations: append-only. Rows are never
    -- updated or deleted; the active assignment of a result is the newest
    -- row whose issue is not merged.
    CREATE TABLE IF NOT EXISTS issue_evaluation_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workspace_id TEXT NOT NULL,
        issue_id INTEGER NOT NULL,
        evaluation_result_id INTEGER NOT NULL,
        created_at DATETIME NOT NULL,
        FOREIGN KEY (issue_id) REFERENCES issues(id),
        FOREIGN KEY (evaluation_result_id) REFERENCES evaluation_results(id)
    );
    CREATE INDEX IF NOT EXISTS idx_ier_issue
        ON issue_evaluation_results(workspace_id, issue_id);
    CREATE INDEX IF NOT EXISTS idx_ier_result
        ON issue_evaluation_results(workspace_id, evaluation_result_id, id);

    -- Evaluation versions: configuration owned by the evaluation subsystem;
    -- lifecycle cascades mutate ignored_at / evaluate_live_logs / trigger_mode.
    CREATE TABLE IF NOT EXISTS evaluation_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workspace_id TEXT NOT NULL,
        issue_id INTEGER,
        ignored_at DATETIME,
        evaluate_live_logs INTEGER NOT NULL DEFAULT 1,
        trigger_mode TEXT NOT NULL DEFAULT 'every_interaction',
        live_capable INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY (issue_id) REFERENCES issues(id)
    );
    CREATE INDEX IF NOT EXISTS idx_evaluation_versions_issue
        ON evaluation_versions(workspace_id, issue_id);

    -- Audit journal, written inside each mutation transaction.
    CREATE TABLE IF NOT EXISTS issue_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workspace_id TEXT NOT NULL,
        issue_id INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        actor TEXT NOT NULL DEFAULT '',
        old_value TEXT,
        new_value TEXT,
        comment TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (issue_id) REFERENCES issues(id)
    );
    CREATE INDEX IF NOT EXISTS idx_issue_events_issue
        ON issue_events(workspace_id, issue_id);
    CREATE INDEX IF NOT EXISTS idx_issue_events_type ON issue_events(event_type);
";

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // WAL for concurrent readers alongside one writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // NORMAL synchronous is safe with WAL: committed data survives OS crash
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    // 8MB page cache, improves the join-heavy listing queries
    conn.pragma_update(None, "cache_size", "-8000")?;
    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    Ok(())
}
