// stubwatch-core/src/remediation.rs
//! Guarded application of suggestions to source files.
//!
//! Files are handled one at a time, in sorted path order. A file is only
//! written after a backup has been taken, and a write the oracle rejects is
//! rolled back before the next file is touched, so no file is left in a
//! state that failed validation. Lines that are not edited keep their exact
//! bytes, line endings included.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::backup::{BackupManager, BackupRef, MutationGuard};
use crate::config::RollbackThresholds;
use crate::errors::StubwatchResult;
use crate::oracle::{OracleVerdict, ValidationOracle};
use crate::rollback::{RollbackAdvisor, RollbackOutcome, RollbackStrategy};
use crate::store::{AuditStore, CorrectionKind, NewCorrection, Outcome, Record};

/// Decides whether a freshly remediated file is incomplete and, if so,
/// produces the content to append to it.
pub trait AutoFiller {
    fn fill(&self, path: &Path, content: &str) -> Option<String>;
}

impl<F> AutoFiller for F
where
    F: Fn(&Path, &str) -> Option<String>,
{
    fn fill(&self, path: &Path, content: &str) -> Option<String> {
        self(path, content)
    }
}

/// Terminates files that lost their final newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingNewlineFiller;

impl AutoFiller for TrailingNewlineFiller {
    fn fill(&self, _path: &Path, content: &str) -> Option<String> {
        if content.is_empty() || content.ends_with('\n') {
            None
        } else {
            Some("\n".to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    LineOutOfRange,
    /// The line no longer reads like the stored context.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub record_id: i64,
    pub line: usize,
    pub reason: SkipReason,
}

/// Content of one file with the suggestions of its records applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub content: Vec<u8>,
    pub applied: Vec<i64>,
    pub skipped: Vec<SkippedRecord>,
}

/// Applies suggestions to `original`. `records` must belong to one file and
/// carry suggestions; they are applied in line order.
pub fn plan_edit(original: &[u8], records: &[&Record]) -> FileEdit {
    let mut lines: Vec<Vec<u8>> = original
        .split_inclusive(|b| *b == b'\n')
        .map(<[u8]>::to_vec)
        .collect();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    let mut ordered: Vec<&&Record> = records.iter().collect();
    ordered.sort_by_key(|r| (r.key.line, r.id));

    for record in ordered {
        let Some(suggestion) = record.suggestion.as_deref() else {
            continue;
        };
        let line_no = record.key.line;
        if line_no == 0 || line_no > lines.len() {
            skipped.push(SkippedRecord {
                record_id: record.id,
                line: line_no,
                reason: SkipReason::LineOutOfRange,
            });
            continue;
        }

        let raw = &lines[line_no - 1];
        let body_len = raw
            .iter()
            .rposition(|b| *b != b'\n' && *b != b'\r')
            .map_or(0, |i| i + 1);
        let (body, ending) = raw.split_at(body_len);
        let text = String::from_utf8_lossy(body);

        if text.trim() != record.key.context {
            debug!("Record {} at {}:{} is stale; skipping.", record.id, record.key.file, line_no);
            skipped.push(SkippedRecord {
                record_id: record.id,
                line: line_no,
                reason: SkipReason::Stale,
            });
            continue;
        }

        let replacement = suggestion.trim();
        let mut new_line = if replacement.is_empty() {
            Vec::new()
        } else {
            let indent_len = text.len() - text.trim_start().len();
            let mut l = text[..indent_len].as_bytes().to_vec();
            l.extend_from_slice(replacement.as_bytes());
            l
        };
        new_line.extend_from_slice(ending);
        lines[line_no - 1] = new_line;
        applied.push(record.id);
    }

    FileEdit {
        content: lines.concat(),
        applied,
        skipped,
    }
}

/// Groups OPEN records that carry a suggestion by file, in sorted path order.
fn group_by_file(records: &[Record]) -> BTreeMap<&str, Vec<&Record>> {
    let mut files: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_open() && r.suggestion.is_some()) {
        files.entry(record.key.file.as_str()).or_default().push(record);
    }
    files
}

/// What would change, without touching anything.
#[derive(Debug, Clone, Serialize)]
pub struct FilePreview {
    pub file: String,
    pub original: String,
    pub remediated: String,
    pub applied: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Computes per-file remediated content for a dry run. Files whose content
/// would not change, and unreadable files, are left out.
pub fn preview(records: &[Record]) -> Vec<FilePreview> {
    let mut previews = Vec::new();
    for (file, records) in group_by_file(records) {
        let original = match std::fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read {} for preview: {}", file, e);
                continue;
            }
        };
        let edit = plan_edit(&original, &records);
        if edit.content == original {
            continue;
        }
        previews.push(FilePreview {
            file: file.to_string(),
            original: String::from_utf8_lossy(&original).into_owned(),
            remediated: String::from_utf8_lossy(&edit.content).into_owned(),
            applied: edit.applied.len(),
            skipped: edit.skipped,
        });
    }
    previews
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FileStatus {
    /// Written and accepted by the oracle.
    Remediated,
    /// Rejected by the oracle and restored (or, if `restored` is false, the
    /// restore itself failed).
    RolledBack { restored: bool, strategy: RollbackStrategy },
    /// Applying the suggestions would not change the file.
    Unchanged,
    /// An I/O error stopped work on this file; its records stay OPEN.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutofillStatus {
    Applied,
    RolledBack,
    /// Rejected, and the backup of the pre-fill content could not be restored.
    RestoreFailed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: FileStatus,
    pub applied: usize,
    pub skipped: Vec<SkippedRecord>,
    pub correction_id: Option<i64>,
    pub backup: Option<BackupRef>,
    pub autofill: Option<AutofillStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemediationReport {
    pub files: Vec<FileReport>,
    pub remediated: usize,
    pub rolled_back: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RemediationReport {
    /// No file failed, and every rejected change was restored from its backup.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
            && self.files.iter().all(|f| {
                !matches!(f.status, FileStatus::RolledBack { restored: false, .. })
                    && f.autofill != Some(AutofillStatus::RestoreFailed)
            })
    }

    fn push(&mut self, report: FileReport) {
        match report.status {
            FileStatus::Remediated => self.remediated += 1,
            FileStatus::RolledBack { .. } => self.rolled_back += 1,
            FileStatus::Unchanged => self.unchanged += 1,
            FileStatus::Failed { .. } => self.failed += 1,
        }
        self.files.push(report);
    }
}

pub struct Remediator<'a> {
    store: &'a AuditStore,
    backups: &'a BackupManager,
    thresholds: RollbackThresholds,
    run_id: &'a str,
    autofiller: Option<&'a dyn AutoFiller>,
}

impl<'a> Remediator<'a> {
    pub fn new(
        store: &'a AuditStore,
        backups: &'a BackupManager,
        thresholds: RollbackThresholds,
        run_id: &'a str,
    ) -> Self {
        Self {
            store,
            backups,
            thresholds,
            run_id,
            autofiller: None,
        }
    }

    pub fn with_autofiller(mut self, autofiller: &'a dyn AutoFiller) -> Self {
        self.autofiller = Some(autofiller);
        self
    }

    /// Applies the suggestions of OPEN records, file by file. Per-file I/O
    /// errors are reported in the result; store errors abort the batch.
    pub fn remediate(&self, records: &[Record], oracle: &dyn ValidationOracle) -> StubwatchResult<RemediationReport> {
        let mut report = RemediationReport::default();
        for (file, records) in group_by_file(records) {
            let file_report = self.remediate_file(file, &records, oracle)?;
            report.push(file_report);
        }
        info!(
            "Remediation finished: {} remediated, {} rolled back, {} unchanged, {} failed.",
            report.remediated, report.rolled_back, report.unchanged, report.failed
        );
        Ok(report)
    }

    fn remediate_file(
        &self,
        file: &str,
        records: &[&Record],
        oracle: &dyn ValidationOracle,
    ) -> StubwatchResult<FileReport> {
        let path = PathBuf::from(file);
        let mut report = FileReport {
            file: file.to_string(),
            status: FileStatus::Unchanged,
            applied: 0,
            skipped: Vec::new(),
            correction_id: None,
            backup: None,
            autofill: None,
        };

        let original = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read {}: {}; its records stay open.", file, e);
                report.status = FileStatus::Failed { error: e.to_string() };
                return Ok(report);
            }
        };

        let edit = plan_edit(&original, records);
        report.applied = edit.applied.len();
        report.skipped = edit.skipped;
        for skip in &report.skipped {
            warn!("Skipped record {} at {}:{} ({:?}).", skip.record_id, file, skip.line, skip.reason);
        }
        if edit.content == original {
            debug!("{} would not change; nothing to do.", file);
            return Ok(report);
        }

        let guard = match self.backups.guard(&path) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Could not back up {}: {}; leaving it untouched.", file, e);
                report.status = FileStatus::Failed { error: e.to_string() };
                return Ok(report);
            }
        };
        if let Err(e) = guard.write(&edit.content) {
            warn!("Could not write {}: {}", file, e);
            report.status = FileStatus::Failed { error: e.to_string() };
            return Ok(report);
        }

        let patterns = describe_patterns(records, &edit.applied);
        match oracle.validate(std::slice::from_ref(&path)) {
            OracleVerdict::Pass => {
                let backup = guard.commit();
                let rationale = format!("Applied {} suggestion(s) for {}", edit.applied.len(), patterns);
                let correction_id = self.log_correction(file, &backup, &rationale, CorrectionKind::Remediation, Outcome::Success)?;
                info!("Remediated {} ({}).", file, rationale);
                report.status = FileStatus::Remediated;
                report.correction_id = Some(correction_id);
                report.backup = Some(backup);

                if let Some(filler) = self.autofiller {
                    report.autofill = self.autofill(&path, &edit.content, filler, oracle)?;
                }
            }
            OracleVerdict::Fail(reason) => {
                let rationale = format!("Validation failed after {} suggestion(s) for {}: {}", edit.applied.len(), patterns, reason);
                let correction_id =
                    self.log_correction(file, guard.backup(), &rationale, CorrectionKind::Remediation, Outcome::Failure)?;
                warn!("Validation rejected {}; rolling back.", file);

                let (backup, outcome) = self.roll_back(guard, correction_id)?;
                report.status = FileStatus::RolledBack {
                    restored: outcome.restored,
                    strategy: outcome.strategy,
                };
                report.correction_id = Some(correction_id);
                report.backup = Some(backup);
            }
        }
        Ok(report)
    }

    fn autofill(
        &self,
        path: &Path,
        content: &[u8],
        filler: &dyn AutoFiller,
        oracle: &dyn ValidationOracle,
    ) -> StubwatchResult<Option<AutofillStatus>> {
        let Some(extra) = filler.fill(path, &String::from_utf8_lossy(content)) else {
            return Ok(None);
        };
        let file = path.to_string_lossy();

        let guard = match self.backups.guard(path) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Could not back up {} for auto-fill: {}", file, e);
                return Ok(Some(AutofillStatus::Failed));
            }
        };
        let mut filled = content.to_vec();
        filled.extend_from_slice(extra.as_bytes());
        if let Err(e) = guard.write(&filled) {
            warn!("Could not auto-fill {}: {}", file, e);
            return Ok(Some(AutofillStatus::Failed));
        }

        match oracle.validate(&[path.to_path_buf()]) {
            OracleVerdict::Pass => {
                let backup = guard.commit();
                let rationale = format!("Auto-filled {} byte(s)", extra.len());
                self.log_correction(&file, &backup, &rationale, CorrectionKind::Autofill, Outcome::Success)?;
                Ok(Some(AutofillStatus::Applied))
            }
            OracleVerdict::Fail(reason) => {
                let rationale = format!("Auto-fill rejected: {}", reason);
                let correction_id =
                    self.log_correction(&file, guard.backup(), &rationale, CorrectionKind::Autofill, Outcome::Failure)?;
                let (_, outcome) = self.roll_back(guard, correction_id)?;
                if outcome.restored {
                    Ok(Some(AutofillStatus::RolledBack))
                } else {
                    Ok(Some(AutofillStatus::RestoreFailed))
                }
            }
        }
    }

    /// Restores a rejected mutation through its backup and records the
    /// attempt. The guard stays armed until the restore has been tried, and
    /// if the backup cannot be restored the guard's in-memory copy is
    /// written back instead. The outcome still reports the failed restore.
    fn roll_back(&self, guard: MutationGuard, correction_id: i64) -> StubwatchResult<(BackupRef, RollbackOutcome)> {
        let advisor = RollbackAdvisor::new(self.store, self.backups, self.thresholds, self.run_id);
        let outcome = advisor.restore(guard.backup(), Some(correction_id))?;
        let backup = if outcome.restored {
            guard.hand_off()
        } else {
            warn!("Writing the in-memory original of {} back.", guard.path().display());
            guard.revert()?
        };
        Ok((backup, outcome))
    }

    fn log_correction(
        &self,
        file: &str,
        backup: &BackupRef,
        rationale: &str,
        kind: CorrectionKind,
        outcome: Outcome,
    ) -> StubwatchResult<i64> {
        let backup_path = backup.path.to_string_lossy();
        self.store.append_correction(&NewCorrection {
            run_id: self.run_id,
            file,
            backup_path: Some(backup_path.as_ref()),
            backup_sha256: Some(backup.sha256.as_str()),
            rationale,
            kind,
            outcome,
        })
    }
}

/// `todo@3, fixme@7` for the applied records.
fn describe_patterns(records: &[&Record], applied: &[i64]) -> String {
    records
        .iter()
        .filter(|r| applied.contains(&r.id))
        .map(|r| format!("{}@{}", r.key.pattern, r.key.line))
        .collect::<Vec<_>>()
        .join(", ")
}
