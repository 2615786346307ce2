// stubwatch-core/src/store/mod.rs
//! The persisted record store.
//!
//! A single SQLite database holds placeholder records, snapshots, and the
//! correction/rollback history. The store offers the three capabilities the
//! engine relies on: insert-if-no-open-record-for-key, bulk status transition,
//! and append-only inserts for snapshots and history. It assumes a single
//! writer per run; concurrent invocations must be serialised by the caller.
//!
//! Any error from this module is fatal for the run.
//!
//! License: MIT OR APACHE 2.0

pub mod models;
pub mod schema;

use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{StubwatchError, StubwatchResult};
use crate::finding::{Finding, NaturalKey};

pub use models::{
    CorrectionEntry, CorrectionKind, DensitySnapshot, NewCorrection, Outcome, Record, RecordStatus,
    RollbackCounts, RollbackEntry, Snapshot,
};

const RECORD_COLUMNS: &str = "id, file_path, line_number, pattern_id, context, suggestion, \
     created_at, author, status, resolved_at, resolved_by";

const CORRECTION_COLUMNS: &str =
    "id, run_id, file_path, backup_path, backup_sha256, rationale, kind, outcome, created_at";

const ROLLBACK_COLUMNS: &str =
    "id, run_id, file_path, backup_path, correction_id, outcome, detail, created_at";

/// Row counts changed by one `apply_transitions` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionCounts {
    pub inserted: usize,
    pub resolved: usize,
}

/// Handle on the SQLite-backed record store.
pub struct AuditStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for AuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStore").field("path", &self.path).finish()
    }
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = StubwatchError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let line: i64 = row.get(2)?;
    Ok(Record {
        id: row.get(0)?,
        key: NaturalKey {
            file: row.get(1)?,
            line: line as usize,
            pattern: row.get(3)?,
            context: row.get(4)?,
        },
        suggestion: row.get(5)?,
        created_at: row.get(6)?,
        author: row.get(7)?,
        status: parse_col(row, 8)?,
        resolved_at: row.get(9)?,
        resolved_by: row.get(10)?,
    })
}

fn correction_from_row(row: &Row<'_>) -> rusqlite::Result<CorrectionEntry> {
    Ok(CorrectionEntry {
        id: row.get(0)?,
        run_id: row.get(1)?,
        file: row.get(2)?,
        backup_path: row.get(3)?,
        backup_sha256: row.get(4)?,
        rationale: row.get(5)?,
        kind: parse_col(row, 6)?,
        outcome: parse_col(row, 7)?,
        created_at: row.get(8)?,
    })
}

fn rollback_from_row(row: &Row<'_>) -> rusqlite::Result<RollbackEntry> {
    Ok(RollbackEntry {
        id: row.get(0)?,
        run_id: row.get(1)?,
        file: row.get(2)?,
        backup_path: row.get(3)?,
        correction_id: row.get(4)?,
        outcome: parse_col(row, 5)?,
        detail: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    let open: i64 = row.get(3)?;
    let resolved: i64 = row.get(4)?;
    Ok(Snapshot {
        id: row.get(0)?,
        run_id: row.get(1)?,
        taken_at: row.get(2)?,
        open_count: open as u64,
        resolved_count: resolved as u64,
    })
}

fn density_from_row(row: &Row<'_>) -> rusqlite::Result<DensitySnapshot> {
    let open: i64 = row.get(3)?;
    let lines: i64 = row.get(4)?;
    Ok(DensitySnapshot {
        id: row.get(0)?,
        run_id: row.get(1)?,
        taken_at: row.get(2)?,
        open_count: open as u64,
        tracked_lines: lines as u64,
        open_per_kloc: row.get(5)?,
    })
}

impl AuditStore {
    /// Opens (creating if needed) the store at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> StubwatchResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StubwatchError::io(parent, e))?;
            }
        }
        info!("Opening record store at {}", path.display());
        let conn = Connection::open(path)?;
        let mut store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.initialise()?;
        Ok(store)
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> StubwatchResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn, path: None };
        store.initialise()?;
        Ok(store)
    }

    fn initialise(&mut self) -> StubwatchResult<()> {
        self.conn.busy_timeout(Duration::from_secs(5))?;
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(schema::SCHEMA_SQL)?;
        self.conn
            .pragma_update(None, "user_version", schema::SCHEMA_VERSION)?;
        debug!("Store schema at version {}", schema::SCHEMA_VERSION);
        Ok(())
    }

    /// Path of the database file; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> StubwatchResult<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    // --- records -------------------------------------------------------

    /// All OPEN records, ordered by file, line and pattern.
    pub fn open_records(&self) -> StubwatchResult<Vec<Record>> {
        self.records(Some(RecordStatus::Open))
    }

    /// Records filtered by status (all records when `None`), oldest first
    /// within a file and line.
    pub fn records(&self, status: Option<RecordStatus>) -> StubwatchResult<Vec<Record>> {
        let sql = match status {
            Some(_) => format!(
                "SELECT {RECORD_COLUMNS} FROM placeholder_records WHERE status = ?1 \
                 ORDER BY file_path, line_number, id"
            ),
            None => format!(
                "SELECT {RECORD_COLUMNS} FROM placeholder_records ORDER BY file_path, line_number, id"
            ),
        };
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = match status {
            Some(s) => stmt.query_map(params![s.as_str()], record_from_row)?,
            None => stmt.query_map([], record_from_row)?,
        };
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn record(&self, id: i64) -> StubwatchResult<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM placeholder_records WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], record_from_row)
            .optional()?)
    }

    /// Applies one reconciliation atomically: resolves the given OPEN record
    /// ids, then inserts an OPEN record for every finding whose key has no
    /// OPEN record yet. Already-resolved ids and already-open keys are no-ops.
    pub fn apply_transitions(
        &mut self,
        inserts: &[Finding],
        resolutions: &[i64],
        actor: &str,
        now: &str,
    ) -> StubwatchResult<TransitionCounts> {
        let tx = self.conn.transaction()?;
        let mut counts = TransitionCounts::default();
        {
            let mut resolve = tx.prepare_cached(
                "UPDATE placeholder_records SET status = 'resolved', resolved_at = ?1, resolved_by = ?2 \
                 WHERE id = ?3 AND status = 'open'",
            )?;
            for id in resolutions {
                counts.resolved += resolve.execute(params![now, actor, id])?;
            }

            let mut insert = tx.prepare_cached(
                "INSERT INTO placeholder_records (file_path, line_number, pattern_id, context, created_at, author, status) \
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, 'open' \
                 WHERE NOT EXISTS (SELECT 1 FROM placeholder_records \
                     WHERE file_path = ?1 AND line_number = ?2 AND pattern_id = ?3 AND context = ?4 AND status = 'open')",
            )?;
            for f in inserts {
                counts.inserted +=
                    insert.execute(params![f.file, f.line as i64, f.pattern, f.context, now, actor])?;
            }
        }
        tx.commit()?;
        debug!(
            "Applied transitions: {} inserted, {} resolved.",
            counts.inserted, counts.resolved
        );
        Ok(counts)
    }

    /// Stores a generated suggestion on an OPEN record.
    pub fn set_suggestion(&self, id: i64, suggestion: Option<&str>) -> StubwatchResult<bool> {
        let changed = self.conn.execute(
            "UPDATE placeholder_records SET suggestion = ?1 WHERE id = ?2 AND status = 'open'",
            params![suggestion, id],
        )?;
        Ok(changed == 1)
    }

    /// (open, resolved) totals.
    pub fn status_counts(&self) -> StubwatchResult<(u64, u64)> {
        let (open, resolved): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(status = 'open'), 0), COALESCE(SUM(status = 'resolved'), 0) \
             FROM placeholder_records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((open as u64, resolved as u64))
    }

    pub fn total_records(&self) -> StubwatchResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM placeholder_records", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    // --- snapshots -----------------------------------------------------

    pub fn append_snapshot(
        &self,
        run_id: &str,
        taken_at: &str,
        open_count: u64,
        resolved_count: u64,
    ) -> StubwatchResult<Snapshot> {
        self.conn.execute(
            "INSERT INTO audit_snapshots (run_id, taken_at, open_count, resolved_count) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, taken_at, open_count as i64, resolved_count as i64],
        )?;
        Ok(Snapshot {
            id: self.conn.last_insert_rowid(),
            run_id: run_id.to_string(),
            taken_at: taken_at.to_string(),
            open_count,
            resolved_count,
        })
    }

    /// Snapshot series, oldest first. `limit` keeps the most recent rows.
    pub fn snapshots(&self, limit: Option<usize>) -> StubwatchResult<Vec<Snapshot>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, run_id, taken_at, open_count, resolved_count FROM \
             (SELECT * FROM audit_snapshots ORDER BY id DESC LIMIT ?1) ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![limit.map_or(-1, |l| l as i64)], snapshot_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn append_density_snapshot(
        &self,
        run_id: &str,
        taken_at: &str,
        open_count: u64,
        tracked_lines: u64,
        open_per_kloc: f64,
    ) -> StubwatchResult<DensitySnapshot> {
        self.conn.execute(
            "INSERT INTO density_snapshots (run_id, taken_at, open_count, tracked_lines, open_per_kloc) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, taken_at, open_count as i64, tracked_lines as i64, open_per_kloc],
        )?;
        Ok(DensitySnapshot {
            id: self.conn.last_insert_rowid(),
            run_id: run_id.to_string(),
            taken_at: taken_at.to_string(),
            open_count,
            tracked_lines,
            open_per_kloc,
        })
    }

    pub fn density_snapshots(&self, limit: Option<usize>) -> StubwatchResult<Vec<DensitySnapshot>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, run_id, taken_at, open_count, tracked_lines, open_per_kloc FROM \
             (SELECT * FROM density_snapshots ORDER BY id DESC LIMIT ?1) ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![limit.map_or(-1, |l| l as i64)], density_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // --- correction / rollback history ----------------------------------

    pub fn append_correction(&self, entry: &NewCorrection<'_>) -> StubwatchResult<i64> {
        self.conn.execute(
            "INSERT INTO corrections (run_id, file_path, backup_path, backup_sha256, rationale, kind, outcome, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.run_id,
                entry.file,
                entry.backup_path,
                entry.backup_sha256,
                entry.rationale,
                entry.kind.as_str(),
                entry.outcome.as_str(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Correction history, newest first.
    pub fn corrections(&self, limit: Option<usize>) -> StubwatchResult<Vec<CorrectionEntry>> {
        let sql = format!("SELECT {CORRECTION_COLUMNS} FROM corrections ORDER BY id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit.map_or(-1, |l| l as i64)], correction_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn correction(&self, id: i64) -> StubwatchResult<Option<CorrectionEntry>> {
        let sql = format!("SELECT {CORRECTION_COLUMNS} FROM corrections WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], correction_from_row)
            .optional()?)
    }

    /// The most recent successful correction that has a backup and has not
    /// been rolled back yet, so repeated calls step back through history.
    pub fn last_restorable_correction(&self) -> StubwatchResult<Option<CorrectionEntry>> {
        let sql = format!(
            "SELECT {CORRECTION_COLUMNS} FROM corrections c \
             WHERE c.outcome = 'success' AND c.backup_path IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM rollbacks r WHERE r.correction_id = c.id AND r.outcome = 'success') \
             ORDER BY c.id DESC LIMIT 1"
        );
        Ok(self.conn.query_row(&sql, [], correction_from_row).optional()?)
    }

    pub fn append_rollback(
        &self,
        run_id: &str,
        file: &str,
        backup_path: Option<&str>,
        correction_id: Option<i64>,
        outcome: Outcome,
        detail: &str,
    ) -> StubwatchResult<i64> {
        self.conn.execute(
            "INSERT INTO rollbacks (run_id, file_path, backup_path, correction_id, outcome, detail, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                file,
                backup_path,
                correction_id,
                outcome.as_str(),
                detail,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Rollback history, newest first.
    pub fn rollbacks(&self, limit: Option<usize>) -> StubwatchResult<Vec<RollbackEntry>> {
        let sql = format!("SELECT {ROLLBACK_COLUMNS} FROM rollbacks ORDER BY id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit.map_or(-1, |l| l as i64)], rollback_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Restore successes and failures recorded for one file.
    pub fn rollback_counts(&self, file: &str) -> StubwatchResult<RollbackCounts> {
        let (successes, failures): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(outcome = 'success'), 0), COALESCE(SUM(outcome = 'failure'), 0) \
             FROM rollbacks WHERE file_path = ?1",
            params![file],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(RollbackCounts {
            successes: successes as u32,
            failures: failures as u32,
        })
    }
}
