//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one table per
//! scheme kind plus the pipeline run history.
//!
//! Writes that must be atomic (a record batch) take their own connection and
//! transaction, so concurrent pipelines never share an open transaction.

mod migrations;
mod tables;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use govdata_schema::{SchemeSchema, schema_for};
use govdata_shared::{
    FieldValue, GovDataError, PipelineRunResult, Result, RunStatus, SchemeKind, TransformedRecord,
};
use libsql::{Connection, Database, Value, params, params_from_iter};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How long a writer waits on a locked database before giving up (ms).
const BUSY_TIMEOUT_MS: u64 = 5_000;

fn storage_err(e: impl std::fmt::Display) -> GovDataError {
    GovDataError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A persisted scheme row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    pub kind: SchemeKind,
    pub state_code: String,
    pub state_name: String,
    pub year: i32,
    /// Every scheme column (fields and derived), `None` when NULL.
    pub values: BTreeMap<String, Option<FieldValue>>,
    pub created_at: String,
    pub updated_at: String,
}

impl StoredRow {
    /// Value of a scheme column, if set.
    pub fn value(&self, column: &str) -> Option<FieldValue> {
        self.values.get(column).copied().flatten()
    }
}

/// One entry of the pipeline run history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub kind: SchemeKind,
    pub resource_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub extracted: u64,
    pub validated: u64,
    pub ingested: u64,
    /// `None` while the run is in progress (or was interrupted).
    pub status: Option<RunStatus>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GovDataError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Fresh connection for a unit of work.
    async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;
        Ok(conn)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        GovDataError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Scheme tables
    // -----------------------------------------------------------------------

    /// Create every scheme table that does not exist yet. Safe to call
    /// before every pipeline run.
    pub async fn init_schemes(&self) -> Result<()> {
        let conn = self.connect().await?;
        for kind in SchemeKind::ALL {
            let schema = schema_for(kind);
            conn.execute(&tables::create_table_sql(schema), params![])
                .await
                .map_err(|e| {
                    GovDataError::Storage(format!("creating table {}: {e}", schema.table()))
                })?;
        }
        debug!("scheme tables ready");
        Ok(())
    }

    /// Upsert a batch of records of one kind as a single transaction.
    ///
    /// Returns the number of distinct rows written: records sharing a
    /// (state_code, year) key collapse into one row, the last one winning.
    /// On any failure the whole batch is rolled back and nothing from it
    /// stays committed.
    #[instrument(skip_all, fields(kind = %kind, records = records.len()))]
    pub async fn upsert_records(
        &self,
        kind: SchemeKind,
        records: &[TransformedRecord],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let schema = schema_for(kind);
        let sql = tables::upsert_sql(schema);
        let conn = self.connect().await?;
        let tx = conn.transaction().await.map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();
        let mut keys = BTreeSet::new();

        for (index, record) in records.iter().enumerate() {
            if record.kind != kind {
                let err = GovDataError::Storage(format!(
                    "record {index} is {} but the batch is {kind}",
                    record.kind
                ));
                rollback(tx, kind).await;
                return Err(err);
            }

            let values = row_params(schema, record, &now);
            if let Err(e) = tx.execute(&sql, params_from_iter(values)).await {
                let err = GovDataError::Storage(format!(
                    "upserting {kind} record {index} ({} {}): {e}",
                    record.state_code, record.year
                ));
                rollback(tx, kind).await;
                return Err(err);
            }
            keys.insert((record.state_code.as_str(), record.year));
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(%kind, records = records.len(), rows = keys.len(), "batch committed");
        Ok(keys.len())
    }

    /// Read back one row by key.
    pub async fn get_row(
        &self,
        kind: SchemeKind,
        state_code: &str,
        year: i32,
    ) -> Result<Option<StoredRow>> {
        let schema = schema_for(kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE state_code = ?1 AND year = ?2",
            tables::select_columns(schema),
            schema.table()
        );
        let mut rows = self
            .conn
            .query(&sql, params![state_code, year])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored(schema, &row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All rows of a kind, ordered by state then year.
    pub async fn list_rows(&self, kind: SchemeKind) -> Result<Vec<StoredRow>> {
        let schema = schema_for(kind);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY state_code, year",
            tables::select_columns(schema),
            schema.table()
        );
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_stored(schema, &row)?);
        }
        Ok(results)
    }

    /// Number of persisted rows for a kind.
    pub async fn count_rows(&self, kind: SchemeKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", schema_for(kind).table());
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            None => Ok(0),
        }
    }

    /// Names of the user tables currently in the database.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut names = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            names.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(names)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a pipeline run. Returns the generated run ID.
    pub async fn insert_run(&self, kind: SchemeKind, resource_id: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO etl_runs (id, kind, resource_id, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), kind.key(), resource_id, now.as_str()],
        )
        .await
        .map_err(storage_err)?;
        Ok(id)
    }

    /// Close a run with its counts and final status.
    pub async fn finish_run(
        &self,
        run_id: &str,
        result: &PipelineRunResult,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE etl_runs
             SET finished_at = ?1, extracted = ?2, validated = ?3, ingested = ?4,
                 status = ?5, error = ?6
             WHERE id = ?7",
            params![
                now.as_str(),
                result.extracted as i64,
                result.validated as i64,
                result.ingested as i64,
                result.status.as_str(),
                error,
                run_id
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, resource_id, started_at, finished_at,
                        extracted, validated, ingested, status, error
                 FROM etl_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn set_busy_timeout(conn: &Connection) -> Result<()> {
    // PRAGMA busy_timeout echoes the new value back as a row.
    let mut rows = conn
        .query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), params![])
        .await
        .map_err(storage_err)?;
    while rows.next().await.map_err(storage_err)?.is_some() {}
    Ok(())
}

async fn rollback(tx: libsql::Transaction, kind: SchemeKind) {
    if let Err(e) = tx.rollback().await {
        warn!(%kind, error = %e, "rollback failed");
    }
}

fn row_params(schema: &SchemeSchema, record: &TransformedRecord, now: &str) -> Vec<Value> {
    let mut values = vec![
        Value::Text(record.state_code.clone()),
        Value::Text(record.state_name.clone()),
        Value::Integer(i64::from(record.year)),
    ];
    values.extend(schema.columns().map(|column| match record.value(column) {
        Some(FieldValue::Int(v)) => Value::Integer(v),
        Some(FieldValue::Float(v)) => Value::Real(v),
        None => Value::Null,
    }));
    values.push(Value::Text(now.to_string()));
    values.push(Value::Text(now.to_string()));
    values
}

fn row_to_stored(schema: &SchemeSchema, row: &libsql::Row) -> Result<StoredRow> {
    let mut values = BTreeMap::new();
    for (offset, column) in schema.columns().enumerate() {
        let value = match row.get_value(3 + offset as i32).map_err(storage_err)? {
            Value::Integer(v) => Some(FieldValue::Int(v)),
            Value::Real(v) => Some(FieldValue::Float(v)),
            Value::Null => None,
            other => {
                return Err(GovDataError::Storage(format!(
                    "unexpected value in {}.{column}: {other:?}",
                    schema.table()
                )));
            }
        };
        values.insert(column.to_string(), value);
    }

    let tail = 3 + schema.columns().count() as i32;
    Ok(StoredRow {
        kind: schema.kind,
        state_code: row.get::<String>(0).map_err(storage_err)?,
        state_name: row.get::<String>(1).map_err(storage_err)?,
        year: row.get::<i32>(2).map_err(storage_err)?,
        values,
        created_at: row.get::<String>(tail).map_err(storage_err)?,
        updated_at: row.get::<String>(tail + 1).map_err(storage_err)?,
    })
}

fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    let kind: String = row.get(1).map_err(storage_err)?;
    let started_at: String = row.get(3).map_err(storage_err)?;
    let finished_at: Option<String> = row.get(4).map_err(storage_err)?;
    let status: Option<String> = row.get(8).map_err(storage_err)?;

    Ok(RunRecord {
        id: row.get(0).map_err(storage_err)?,
        kind: SchemeKind::from_str(&kind)?,
        resource_id: row.get(2).map_err(storage_err)?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        extracted: row.get::<i64>(5).map_err(storage_err)? as u64,
        validated: row.get::<i64>(6).map_err(storage_err)? as u64,
        ingested: row.get::<i64>(7).map_err(storage_err)? as u64,
        status: status.as_deref().map(RunStatus::from_str).transpose()?,
        error: row.get(9).map_err(storage_err)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GovDataError::Storage(format!("bad timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("govdata_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        storage.init_schemes().await.expect("init schemes");
        storage
    }

    fn pmay(state_code: &str, year: i32, fields: &[(&'static str, FieldValue)]) -> TransformedRecord {
        TransformedRecord {
            kind: SchemeKind::Pmay,
            state_code: state_code.into(),
            state_name: format!("{state_code} state"),
            year,
            fields: fields.iter().copied().collect(),
            derived: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration_and_init() {
        let tmp = std::env::temp_dir().join(format!("govdata_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        s1.init_schemes().await.expect("first init");
        drop(s1);

        let s2 = Storage::open(&tmp).await.expect("second open");
        s2.init_schemes().await.expect("second init");
        assert_eq!(s2.get_schema_version().await, 1);

        let tables = s2.table_names().await.unwrap();
        for expected in ["etl_runs", "mnrega", "pmay", "saubhagya", "schema_migrations", "startup_india"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}: {tables:?}");
        }
    }

    #[tokio::test]
    async fn loading_twice_leaves_one_row() {
        let storage = test_storage().await;
        let batch = vec![pmay("MH", 2023, &[("beneficiaries", FieldValue::Int(100))])];

        assert_eq!(storage.upsert_records(SchemeKind::Pmay, &batch).await.unwrap(), 1);
        assert_eq!(storage.upsert_records(SchemeKind::Pmay, &batch).await.unwrap(), 1);

        assert_eq!(storage.count_rows(SchemeKind::Pmay).await.unwrap(), 1);
        let row = storage
            .get_row(SchemeKind::Pmay, "MH", 2023)
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(row.value("beneficiaries"), Some(FieldValue::Int(100)));
        assert_eq!(row.value("houses_completed"), None);
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_batch_count_once() {
        let storage = test_storage().await;
        let batch = vec![
            pmay("MH", 2023, &[("beneficiaries", FieldValue::Int(100))]),
            pmay("UP", 2023, &[]),
            pmay("MH", 2023, &[("beneficiaries", FieldValue::Int(250))]),
        ];

        assert_eq!(storage.upsert_records(SchemeKind::Pmay, &batch).await.unwrap(), 2);
        assert_eq!(storage.count_rows(SchemeKind::Pmay).await.unwrap(), 2);

        let row = storage
            .get_row(SchemeKind::Pmay, "MH", 2023)
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(row.value("beneficiaries"), Some(FieldValue::Int(250)));
    }

    #[tokio::test]
    async fn reload_overwrites_and_keeps_created_at() {
        let storage = test_storage().await;

        let mut first = pmay(
            "KA",
            2022,
            &[
                ("beneficiaries", FieldValue::Int(10)),
                ("houses_completed", FieldValue::Int(5)),
                ("funds_released", FieldValue::Float(1.5)),
            ],
        );
        first.derived.insert("houses_per_beneficiary", 0.5);
        storage.upsert_records(SchemeKind::Pmay, &[first]).await.unwrap();
        let before = storage.get_row(SchemeKind::Pmay, "KA", 2022).await.unwrap().unwrap();

        let second = pmay("KA", 2022, &[("beneficiaries", FieldValue::Int(0))]);
        storage.upsert_records(SchemeKind::Pmay, &[second]).await.unwrap();
        let after = storage.get_row(SchemeKind::Pmay, "KA", 2022).await.unwrap().unwrap();

        assert_eq!(after.value("beneficiaries"), Some(FieldValue::Int(0)));
        assert_eq!(after.value("houses_per_beneficiary"), None);
        assert_eq!(after.value("funds_released"), None);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn failed_batch_is_rolled_back() {
        let storage = test_storage().await;
        let batch = vec![
            pmay("MH", 2023, &[("beneficiaries", FieldValue::Int(1))]),
            // Bypasses validation; the table CHECK rejects it.
            pmay("UP", 1999, &[]),
        ];

        let err = storage.upsert_records(SchemeKind::Pmay, &batch).await.unwrap_err();
        assert!(matches!(err, GovDataError::Storage(_)));
        assert_eq!(storage.count_rows(SchemeKind::Pmay).await.unwrap(), 0);

        // The connection is usable afterwards.
        storage.upsert_records(SchemeKind::Pmay, &batch[..1]).await.unwrap();
        assert_eq!(storage.count_rows(SchemeKind::Pmay).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mismatched_kind_is_rejected() {
        let storage = test_storage().await;
        let batch = vec![pmay("MH", 2023, &[])];
        assert!(storage.upsert_records(SchemeKind::Mnrega, &batch).await.is_err());
        assert_eq!(storage.count_rows(SchemeKind::Mnrega).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_rows_is_ordered() {
        let storage = test_storage().await;
        let batch = vec![
            pmay("MH", 2023, &[]),
            pmay("DL", 2021, &[]),
            pmay("MH", 2021, &[]),
        ];
        storage.upsert_records(SchemeKind::Pmay, &batch).await.unwrap();

        let rows = storage.list_rows(SchemeKind::Pmay).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| (r.state_code.as_str(), r.year)).collect();
        assert_eq!(keys, [("DL", 2021), ("MH", 2021), ("MH", 2023)]);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let storage = test_storage().await;
        assert_eq!(storage.upsert_records(SchemeKind::Saubhagya, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage.insert_run(SchemeKind::Mnrega, "rid-2").await.unwrap();

        let pending = storage.list_runs(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, None);
        assert!(pending[0].finished_at.is_none());

        let result = PipelineRunResult {
            kind: SchemeKind::Mnrega,
            ingested: 0,
            extracted: 0,
            validated: 0,
            status: RunStatus::Degraded,
            run_id: Some(run_id.clone()),
        };
        storage
            .finish_run(&run_id, &result, Some("network error: HTTP 500"))
            .await
            .unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs[0].id, run_id);
        assert_eq!(runs[0].kind, SchemeKind::Mnrega);
        assert_eq!(runs[0].resource_id, "rid-2");
        assert_eq!(runs[0].status, Some(RunStatus::Degraded));
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].error.as_deref(), Some("network error: HTTP 500"));
    }

    #[tokio::test]
    async fn list_runs_newest_first_with_limit() {
        let storage = test_storage().await;
        let first = storage.insert_run(SchemeKind::Pmay, "a").await.unwrap();
        let second = storage.insert_run(SchemeKind::Pmay, "b").await.unwrap();
        let third = storage.insert_run(SchemeKind::Pmay, "c").await.unwrap();

        let runs = storage.list_runs(2).await.unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, [third.as_str(), second.as_str()]);
        assert!(!ids.contains(&first.as_str()));
    }
}
