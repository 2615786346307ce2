// stubwatch-core/src/run.rs
//! One invocation of the engine.
//!
//! An `AuditRun` owns the run id and the run's `Snapshotter`, and sequences
//! the stages strictly in order: scan, reconcile, snapshot, generate tasks,
//! then (for `apply`) remediate and verify with a second, resolve-only pass.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::backup::BackupManager;
use crate::config::AuditConfig;
use crate::errors::StubwatchResult;
use crate::oracle::ValidationOracle;
use crate::patterns::compiler::{get_or_compile_patterns, CompiledPatterns};
use crate::reconcile::{reconcile, ReconcileMode, ReconcileOutcome};
use crate::remediation::{self, AutoFiller, FilePreview, RemediationReport, Remediator};
use crate::scanner::{ScanOutcome, Scanner};
use crate::snapshot::Snapshotter;
use crate::store::{AuditStore, DensitySnapshot, Snapshot};
use crate::tasks::{Task, TaskGenerator, TemplateTokenRewriter};

/// Counters and results of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub lines_scanned: usize,
    pub findings: usize,
    pub timed_out: bool,
    pub inserted: usize,
    pub resolved: usize,
    pub tasks: usize,
    pub snapshot: Option<Snapshot>,
    pub density: Option<DensitySnapshot>,
    pub remediation: Option<RemediationReport>,
    /// Records resolved by the verification pass after remediation.
    pub verified_resolved: usize,
    /// The completeness check held: every distinct finding has a record.
    pub validated: bool,
    /// Store and file operations completed. Says nothing about how many
    /// placeholders remain.
    pub success: bool,
}

impl RunReport {
    fn absorb_scan(&mut self, scan: &ScanOutcome) {
        self.files_scanned = scan.files_scanned;
        self.files_skipped = scan.files_skipped;
        self.lines_scanned = scan.lines_scanned;
        self.findings = scan.findings.len();
        self.timed_out = scan.timed_out;
    }

    fn absorb_reconcile(&mut self, outcome: &ReconcileOutcome) {
        self.inserted += outcome.inserted;
        self.resolved += outcome.resolved;
        self.validated = outcome.complete;
    }
}

pub struct AuditRun<'a> {
    run_id: String,
    config: &'a AuditConfig,
    store: &'a mut AuditStore,
    patterns: Arc<CompiledPatterns>,
    scan_root: PathBuf,
    excluded: Vec<PathBuf>,
    snapshotter: Snapshotter,
    rewriter: TemplateTokenRewriter,
}

impl<'a> AuditRun<'a> {
    /// Starts a run over `scan_root` with a fresh run id.
    pub fn new(config: &'a AuditConfig, store: &'a mut AuditStore, scan_root: impl AsRef<Path>) -> StubwatchResult<Self> {
        let active = config.active_patterns();
        if active.is_empty() {
            warn!("No active patterns; scans will find nothing.");
        }
        let patterns = get_or_compile_patterns(&active)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting run {}", run_id);

        let mut excluded = Vec::new();
        if let Some(db) = store.path() {
            excluded.push(db.to_path_buf());
        }

        Ok(Self {
            snapshotter: Snapshotter::new(run_id.clone()),
            rewriter: TemplateTokenRewriter::new(config.tasks.known_placeholders.iter().cloned()),
            run_id,
            config,
            store,
            patterns,
            scan_root: scan_root.as_ref().to_path_buf(),
            excluded,
        })
    }

    /// Keeps `path` out of every scan of this run (the backup root, for one).
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &AuditStore {
        &*self.store
    }

    fn scanner(&self) -> StubwatchResult<Scanner> {
        let settings = &self.config.scan;
        let mut scanner = Scanner::new(&self.scan_root, Arc::clone(&self.patterns))?
            .with_exclusions(&settings.exclude)
            .with_budget(settings.timeout_secs.map(Duration::from_secs))
            .with_context_max_len(settings.context_max_len);
        for path in &self.excluded {
            scanner = scanner.exclude_path(path);
        }
        Ok(scanner)
    }

    fn new_report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    /// Scan, reconcile, snapshot, and persist suggestions for OPEN records.
    fn audit(&mut self, report: &mut RunReport) -> StubwatchResult<()> {
        let scan = self.scanner()?.scan();
        report.absorb_scan(&scan);

        let outcome = reconcile(self.store, &scan.findings, ReconcileMode::Full, scan.timed_out, &self.config.author)?;
        report.absorb_reconcile(&outcome);

        report.snapshot = Some(self.snapshotter.snapshot(self.store)?);
        report.density = Some(self.snapshotter.density(self.store, scan.lines_scanned as u64)?);

        let tasks = self.tasks()?;
        let mut updated = 0;
        for task in &tasks {
            if self.store.set_suggestion(task.record_id, Some(&task.suggestion))? {
                updated += 1;
            }
        }
        debug!("Stored suggestions on {} record(s).", updated);
        report.tasks = tasks.len();
        report.success = true;
        Ok(())
    }

    /// Tasks for the current OPEN records. Read-only.
    pub fn tasks(&self) -> StubwatchResult<Vec<Task>> {
        let records = self.store.open_records()?;
        TaskGenerator::new(&self.patterns, &self.config.tasks)
            .with_rewriter(&self.rewriter)
            .generate(&records)
    }

    /// Scan-only run.
    pub fn scan(&mut self) -> StubwatchResult<RunReport> {
        let mut report = self.new_report();
        self.audit(&mut report)?;
        Ok(report)
    }

    /// Resolves records whose placeholder is gone. Never inserts.
    pub fn resolve(&mut self) -> StubwatchResult<RunReport> {
        let mut report = self.new_report();
        let scan = self.scanner()?.scan();
        report.absorb_scan(&scan);
        let outcome = reconcile(self.store, &scan.findings, ReconcileMode::ResolveOnly, scan.timed_out, &self.config.author)?;
        report.absorb_reconcile(&outcome);
        report.snapshot = Some(self.snapshotter.snapshot(self.store)?);
        report.success = true;
        Ok(report)
    }

    /// Audits, then computes the remediated content of every file without
    /// writing files or correction history.
    pub fn preview(&mut self) -> StubwatchResult<(RunReport, Vec<FilePreview>)> {
        let mut report = self.new_report();
        self.audit(&mut report)?;
        let previews = remediation::preview(&self.store.open_records()?);
        Ok((report, previews))
    }

    /// Audits, applies suggestions under the oracle, then verifies.
    pub fn apply(
        &mut self,
        backups: &BackupManager,
        oracle: &dyn ValidationOracle,
        autofiller: Option<&dyn AutoFiller>,
    ) -> StubwatchResult<RunReport> {
        let mut report = self.new_report();
        self.audit(&mut report)?;

        let records = self.store.open_records()?;
        let mut remediator = Remediator::new(self.store, backups, self.config.rollback, &self.run_id);
        if let Some(filler) = autofiller {
            remediator = remediator.with_autofiller(filler);
        }
        let remediation = remediator.remediate(&records, oracle)?;

        let mut scanner = self.scanner()?;
        scanner = scanner.exclude_path(backups.root());
        let verification = scanner.scan();
        let verified = reconcile(
            self.store,
            &verification.findings,
            ReconcileMode::ResolveOnly,
            verification.timed_out,
            &self.config.author,
        )?;
        report.verified_resolved = verified.resolved;
        info!("Verification pass resolved {} record(s).", verified.resolved);

        report.success = remediation.is_clean();
        report.remediation = Some(remediation);
        Ok(report)
    }
}
