//! # Run History
//!
//! Every finished run is appended to `history.db` in the report directory so
//! the `history` command and the dashboard can list past runs.

use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{Connection, params};

use crate::report::Report;

const HISTORY_FILE: &str = "history.db";

/// One row of the run history.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub title: String,
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub report_paths: Vec<String>,
}

impl RunRecord {
    pub fn from_report(report: &Report, report_paths: &[PathBuf]) -> Self {
        let meta = &report.metadata;
        Self {
            run_id: meta.run_id.clone(),
            title: meta.title.clone(),
            started_at: meta.started_at.to_rfc3339(),
            finished_at: meta.finished_at.to_rfc3339(),
            total: report.summary.total,
            passed: report.summary.passed,
            failed: report.summary.failed,
            errors: report.summary.errors,
            skipped: report.summary.skipped,
            cancelled: meta.cancelled,
            report_paths: report_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        }
    }
}

pub fn history_path(report_dir: &Path) -> PathBuf {
    report_dir.join(HISTORY_FILE)
}

pub fn open_db(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|err| format!("Failed to open SQLite: {err}"))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|err| format!("Failed to set SQLite journal mode: {err}"))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS runs (
         run_id TEXT PRIMARY KEY,
         title TEXT NOT NULL,
         started_at TEXT NOT NULL,
         finished_at TEXT NOT NULL,
         total INTEGER NOT NULL,
         passed INTEGER NOT NULL,
         failed INTEGER NOT NULL,
         errors INTEGER NOT NULL,
         skipped INTEGER NOT NULL,
         cancelled INTEGER NOT NULL,
         report_paths TEXT NOT NULL
       );",
    )
    .map_err(|err| format!("Failed to initialize SQLite schema: {err}"))?;

    Ok(conn)
}

pub fn record_run(conn: &Connection, record: &RunRecord) -> Result<(), String> {
    let report_paths = serde_json::to_string(&record.report_paths)
        .map_err(|err| format!("Failed to serialize report paths: {err}"))?;

    conn.execute(
        "INSERT OR REPLACE INTO runs
         (run_id, title, started_at, finished_at, total, passed, failed, errors, skipped, cancelled, report_paths)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        params![
            record.run_id,
            record.title,
            record.started_at,
            record.finished_at,
            record.total as i64,
            record.passed as i64,
            record.failed as i64,
            record.errors as i64,
            record.skipped as i64,
            record.cancelled,
            report_paths,
        ],
    )
    .map_err(|err| format!("Failed to record run in SQLite: {err}"))?;

    Ok(())
}

/// Most recent runs first.
pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>, String> {
    let mut statement = conn
        .prepare(
            "SELECT run_id, title, started_at, finished_at, total, passed, failed, errors, skipped, cancelled, report_paths
         FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1;",
        )
        .map_err(|err| format!("Failed to query run history: {err}"))?;

    let rows = statement
        .query_map(params![limit as i64], |row| {
            let paths: String = row.get(10)?;
            let report_paths = serde_json::from_str(&paths)
                .map_err(|err| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(err)))?;
            Ok(RunRecord {
                run_id: row.get(0)?,
                title: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                total: row.get::<_, i64>(4)? as usize,
                passed: row.get::<_, i64>(5)? as usize,
                failed: row.get::<_, i64>(6)? as usize,
                errors: row.get::<_, i64>(7)? as usize,
                skipped: row.get::<_, i64>(8)? as usize,
                cancelled: row.get(9)?,
                report_paths,
            })
        })
        .map_err(|err| format!("Failed to query run history: {err}"))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("Failed to read run history: {err}"))
}

/// Appends a finished run to the history in `report_dir`.
pub fn append(report_dir: &Path, record: &RunRecord) -> Result<(), String> {
    let conn = open_db(&history_path(report_dir))?;
    record_run(&conn, record)
}

/// Lists recent runs from the history in `report_dir`. A missing database
/// means no runs yet.
pub fn load_recent(report_dir: &Path, limit: usize) -> Result<Vec<RunRecord>, String> {
    let path = history_path(report_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    recent(&open_db(&path)?, limit)
}
