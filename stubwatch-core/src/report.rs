// stubwatch-core/src/report.rs
//! Read-only, serialisable views over the store.
//!
//! Nothing here writes to the store. `write_dashboard` is the one function
//! that touches the filesystem, and only under the directory it is given.

use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::RollbackThresholds;
use crate::errors::{StubwatchError, StubwatchResult};
use crate::rollback::{suggest_strategy, RollbackStrategy};
use crate::store::{
    AuditStore, CorrectionEntry, CorrectionKind, DensitySnapshot, Outcome, Record, RecordStatus,
    RollbackCounts, RollbackEntry, Snapshot,
};

/// File name of the dashboard summary.
pub const DASHBOARD_FILE_NAME: &str = "placeholder_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Complete,
    IssuesPending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub timestamp: String,
    /// OPEN records.
    pub findings: u64,
    pub resolved_count: u64,
    pub progress_status: ProgressStatus,
}

pub fn dashboard_summary(store: &AuditStore) -> StubwatchResult<DashboardSummary> {
    let (open, resolved) = store.status_counts()?;
    Ok(DashboardSummary {
        timestamp: chrono::Utc::now().to_rfc3339(),
        findings: open,
        resolved_count: resolved,
        progress_status: if open == 0 {
            ProgressStatus::Complete
        } else {
            ProgressStatus::IssuesPending
        },
    })
}

/// Writes the dashboard summary into `dir`, creating it if needed.
pub fn write_dashboard(store: &AuditStore, dir: &Path) -> StubwatchResult<PathBuf> {
    let summary = dashboard_summary(store)?;
    std::fs::create_dir_all(dir).map_err(|e| StubwatchError::io(dir, e))?;
    let path = dir.join(DASHBOARD_FILE_NAME);
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| StubwatchError::Fatal(format!("could not serialise dashboard summary: {e}")))?;
    std::fs::write(&path, json).map_err(|e| StubwatchError::io(&path, e))?;
    info!("Dashboard summary written to {}", path.display());
    Ok(path)
}

/// Row of the legacy `todo_fixme_tracking` table shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRow {
    pub file_path: String,
    pub line_number: usize,
    pub placeholder_type: String,
    pub context: String,
    pub timestamp: String,
    pub resolved: bool,
    pub resolved_timestamp: Option<String>,
    pub status: String,
    pub removal_id: i64,
}

impl From<&Record> for TrackingRow {
    fn from(record: &Record) -> Self {
        Self {
            file_path: record.key.file.clone(),
            line_number: record.key.line,
            placeholder_type: record.key.pattern.clone(),
            context: record.key.context.clone(),
            timestamp: record.created_at.clone(),
            resolved: record.status == RecordStatus::Resolved,
            resolved_timestamp: record.resolved_at.clone(),
            status: record.status.to_string(),
            removal_id: record.id,
        }
    }
}

pub fn tracking_view(store: &AuditStore) -> StubwatchResult<Vec<TrackingRow>> {
    Ok(store.records(None)?.iter().map(TrackingRow::from).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSeries {
    pub snapshots: Vec<Snapshot>,
    pub density: Vec<DensitySnapshot>,
}

pub fn snapshot_series(store: &AuditStore, limit: Option<usize>) -> StubwatchResult<SnapshotSeries> {
    Ok(SnapshotSeries {
        snapshots: store.snapshots(limit)?,
        density: store.density_snapshots(limit)?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub corrections: Vec<CorrectionEntry>,
    pub rollbacks: Vec<RollbackEntry>,
}

pub fn history(store: &AuditStore, limit: Option<usize>) -> StubwatchResult<History> {
    Ok(History {
        corrections: store.corrections(limit)?,
        rollbacks: store.rollbacks(limit)?,
    })
}

/// Coarse root-cause label for a correction, from its rationale text.
pub fn derive_root_cause(rationale: &str) -> &'static str {
    let lower = rationale.to_lowercase();
    if lower.contains("syntax") {
        "coding standards"
    } else if lower.contains("dependency") {
        "dependency issue"
    } else {
        "unspecified"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionSummaryItem {
    pub id: i64,
    pub file_path: String,
    pub rationale: String,
    pub kind: CorrectionKind,
    pub outcome: Outcome,
    pub backup_path: Option<String>,
    pub created_at: String,
    pub root_cause: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionSummary {
    pub timestamp: String,
    pub total_corrections: usize,
    pub successes: usize,
    pub failures: usize,
    pub corrections: Vec<CorrectionSummaryItem>,
}

pub fn correction_summary(store: &AuditStore, max_entries: usize) -> StubwatchResult<CorrectionSummary> {
    let entries = store.corrections(Some(max_entries))?;
    let successes = entries.iter().filter(|c| c.outcome == Outcome::Success).count();
    let corrections: Vec<CorrectionSummaryItem> = entries
        .into_iter()
        .map(|c| CorrectionSummaryItem {
            root_cause: derive_root_cause(&c.rationale),
            id: c.id,
            file_path: c.file,
            rationale: c.rationale,
            kind: c.kind,
            outcome: c.outcome,
            backup_path: c.backup_path,
            created_at: c.created_at,
        })
        .collect();
    Ok(CorrectionSummary {
        timestamp: chrono::Utc::now().to_rfc3339(),
        total_corrections: corrections.len(),
        successes,
        failures: corrections.len() - successes,
        corrections,
    })
}

/// Rollback advice for one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileAdvice {
    pub file: String,
    pub counts: RollbackCounts,
    pub strategy: RollbackStrategy,
    pub advice: &'static str,
}

pub fn advice_for(store: &AuditStore, thresholds: RollbackThresholds, file: &str) -> StubwatchResult<FileAdvice> {
    let counts = store.rollback_counts(file)?;
    let strategy = suggest_strategy(counts, thresholds);
    Ok(FileAdvice {
        file: file.to_string(),
        counts,
        strategy,
        advice: strategy.advice(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Finding;
    use crate::store::NewCorrection;

    #[test]
    fn root_cause_labels() {
        assert_eq!(derive_root_cause("Validation failed: SyntaxError"), "coding standards");
        assert_eq!(derive_root_cause("missing Dependency"), "dependency issue");
        assert_eq!(derive_root_cause("oracle said no"), "unspecified");
    }

    #[test]
    fn dashboard_reflects_open_count() {
        let mut store = AuditStore::open_in_memory().unwrap();
        assert_eq!(dashboard_summary(&store).unwrap().progress_status, ProgressStatus::Complete);

        store
            .apply_transitions(&[Finding::new("a.py", 1, "todo", "# TODO")], &[], "me", "now")
            .unwrap();
        let summary = dashboard_summary(&store).unwrap();
        assert_eq!(summary.findings, 1);
        assert_eq!(summary.progress_status, ProgressStatus::IssuesPending);

        let dir = tempfile::tempdir().unwrap();
        let path = write_dashboard(&store, &dir.path().join("dashboard")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["progress_status"], "issues_pending");
    }

    #[test]
    fn tracking_view_uses_legacy_shape() {
        let mut store = AuditStore::open_in_memory().unwrap();
        store
            .apply_transitions(&[Finding::new("a.py", 4, "fixme", "# FIXME")], &[], "me", "now")
            .unwrap();
        let id = store.open_records().unwrap()[0].id;
        store.apply_transitions(&[], &[id], "me", "later").unwrap();

        let rows = tracking_view(&store).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].resolved);
        assert_eq!(rows[0].status, "resolved");
        assert_eq!(rows[0].placeholder_type, "fixme");
        assert_eq!(rows[0].resolved_timestamp.as_deref(), Some("later"));
    }

    #[test]
    fn correction_summary_counts_outcomes() {
        let store = AuditStore::open_in_memory().unwrap();
        let entry = NewCorrection {
            run_id: "r",
            file: "a.py",
            backup_path: None,
            backup_sha256: None,
            rationale: "Validation failed: syntax error",
            kind: CorrectionKind::Remediation,
            outcome: Outcome::Failure,
        };
        store.append_correction(&entry).unwrap();
        store
            .append_correction(&NewCorrection { outcome: Outcome::Success, rationale: "ok", ..entry })
            .unwrap();

        let summary = correction_summary(&store, 10).unwrap();
        assert_eq!((summary.total_corrections, summary.successes, summary.failures), (2, 1, 1));
        assert_eq!(summary.corrections[1].root_cause, "coding standards");
    }
}
