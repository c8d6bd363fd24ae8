//! SQL migration definitions for the govdata database.
//!
//! Migrations are applied in order on database open and cover the fixed
//! bookkeeping tables only. Scheme tables are generated from the schema
//! registry by [`crate::Storage::init_schemes`].

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: schema_migrations, etl_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pipeline run history
CREATE TABLE IF NOT EXISTS etl_runs (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    extracted   INTEGER NOT NULL DEFAULT 0,
    validated   INTEGER NOT NULL DEFAULT 0,
    ingested    INTEGER NOT NULL DEFAULT 0,
    status      TEXT,
    error       TEXT
);

CREATE INDEX IF NOT EXISTS idx_etl_runs_kind ON etl_runs(kind);
CREATE INDEX IF NOT EXISTS idx_etl_runs_started ON etl_runs(started_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
