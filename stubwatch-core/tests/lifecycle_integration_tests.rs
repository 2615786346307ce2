// stubwatch-core/tests/lifecycle_integration_tests.rs
use anyhow::Result;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use test_log::test; // For integrating with `env_logger` in tests

use stubwatch_core::remediation::{AutofillStatus, FileStatus};
use stubwatch_core::{
    AuditConfig, AuditRun, AutoFiller, AuditStore, BackupManager, BackupRef, Outcome, RecordStatus, RollbackAdvisor,
    RollbackStrategy, StubwatchError, TrailingNewlineFiller,
};

struct Workspace {
    src: TempDir,
    state: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        Ok(Self {
            src: tempdir()?,
            state: tempdir()?,
        })
    }

    fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.src.path().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    fn store(&self) -> Result<AuditStore> {
        Ok(AuditStore::open(self.state.path().join("audit.db"))?)
    }

    fn backups(&self) -> Result<BackupManager> {
        Ok(BackupManager::new(self.state.path().join("backups"), self.src.path())?)
    }
}

fn passing(_: &[PathBuf]) -> bool {
    true
}

fn failing(_: &[PathBuf]) -> bool {
    false
}

fn backup_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn test_scan_records_marker_and_suggests_fix() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("a.py", "x = 1  # TODO remove\n")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;

    let mut run = AuditRun::new(&config, &mut store, ws.src.path())?;
    let report = run.scan()?;
    assert_eq!(report.findings, 1);
    assert_eq!(report.inserted, 1);
    assert!(report.validated);
    assert!(report.success);

    let tasks = run.tasks()?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].suggestion, "x = 1");
    assert_eq!(tasks[0].pattern, "todo");
    assert!(tasks[0].description.starts_with("Remove todo placeholder in "));
    drop(run);

    let open = store.open_records()?;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].suggestion.as_deref(), Some("x = 1"));
    Ok(())
}

#[test]
fn test_repeated_scans_are_idempotent() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write("a.py", "# TODO one\n# FIXME two\n")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;

    let first = AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;
    let second = AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;
    assert_eq!(first.inserted, 2);
    assert_eq!((second.inserted, second.resolved), (0, 0));
    assert_eq!(store.total_records()?, 2);
    assert_eq!(store.snapshots(None)?.len(), 2);
    Ok(())
}

#[test]
fn test_apply_with_passing_oracle_resolves_record() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("a.py", "x = 1  # TODO remove\n")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    let report = AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &passing, None)?;
    let remediation = report.remediation.as_ref().expect("apply reports remediation");
    assert_eq!(remediation.remediated, 1);
    assert_eq!(report.verified_resolved, 1);
    assert!(report.success);
    assert_eq!(fs::read_to_string(&file)?, "x = 1\n");

    let records = store.records(None)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Resolved);
    assert!(records[0].resolved_at.is_some());

    let corrections = store.corrections(None)?;
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].outcome, Outcome::Success);
    let backup_path = corrections[0].backup_path.clone().expect("correction has a backup");
    assert_eq!(fs::read_to_string(backup_path)?, "x = 1  # TODO remove\n");

    // The next run sees nothing open.
    let next = AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;
    assert_eq!(next.snapshot.expect("snapshot taken").open_count, 0);
    Ok(())
}

#[test]
fn test_apply_with_failing_oracle_restores_file() -> Result<()> {
    let ws = Workspace::new()?;
    let original = "x = 1  # TODO remove\n";
    let file = ws.write("a.py", original)?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    let report = AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &failing, None)?;
    let remediation = report.remediation.expect("apply reports remediation");
    assert_eq!(remediation.rolled_back, 1);
    assert!(matches!(
        remediation.files[0].status,
        FileStatus::RolledBack { restored: true, strategy: RollbackStrategy::Standard }
    ));
    assert_eq!(fs::read_to_string(&file)?, original);

    let corrections = store.corrections(None)?;
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].outcome, Outcome::Failure);

    let rollbacks = store.rollbacks(None)?;
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].outcome, Outcome::Success);
    assert_eq!(rollbacks[0].correction_id, Some(corrections[0].id));

    assert_eq!(store.open_records()?.len(), 1);
    Ok(())
}

#[test]
fn test_store_error_after_rejection_still_restores_file() -> Result<()> {
    let ws = Workspace::new()?;
    let original = "x = 1  # TODO remove\n";
    let file = ws.write("a.py", original)?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    // Rejects the change and takes the history tables away before they are written.
    let db = ws.state.path().join("audit.db");
    let rejecting = |_: &[PathBuf]| {
        let conn = rusqlite::Connection::open(&db).expect("second connection");
        conn.execute_batch("DROP TABLE rollbacks; DROP TABLE corrections;")
            .expect("drop history tables");
        false
    };

    let result = AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &rejecting, None);
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&file)?, original);
    Ok(())
}

#[test]
fn test_rejected_autofill_with_lost_backup_fails_the_run() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("a.py", "x = 1  # TODO remove")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;
    let backup_root = backups.root().to_path_buf();

    // Accepts the remediation, then loses every backup and rejects the auto-fill.
    let calls = Cell::new(0);
    let oracle = |_: &[PathBuf]| {
        calls.set(calls.get() + 1);
        if calls.get() == 1 {
            return true;
        }
        for entry in fs::read_dir(&backup_root).expect("backup root") {
            fs::remove_file(entry.expect("backup entry").path()).expect("remove backup");
        }
        false
    };

    let filler = TrailingNewlineFiller;
    let report = AuditRun::new(&config, &mut store, ws.src.path())?
        .apply(&backups, &oracle, Some(&filler as &dyn AutoFiller))?;
    let remediation = report.remediation.as_ref().expect("apply reports remediation");
    assert_eq!(remediation.files[0].status, FileStatus::Remediated);
    assert_eq!(remediation.files[0].autofill, Some(AutofillStatus::RestoreFailed));
    assert!(!report.success);
    // The rejected fill is gone even though its backup was.
    assert_eq!(fs::read_to_string(&file)?, "x = 1");

    let rollbacks = store.rollbacks(None)?;
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].outcome, Outcome::Failure);
    Ok(())
}

#[test]
fn test_unreadable_file_fails_alone() -> Result<()> {
    let ws = Workspace::new()?;
    let a = ws.write("a.py", "a = 1  # TODO remove\n")?;
    let b = ws.write("b.py", "b = 2  # TODO remove\n")?;
    let c = ws.write("c.py", "c = 3  # TODO remove\n")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    // Files are handled in path order: b.py is away while it is remediated
    // and back in place for the verification scan.
    let parked = ws.state.path().join("b.py.parked");
    let oracle = |files: &[PathBuf]| {
        if files[0].ends_with("a.py") {
            fs::rename(&b, &parked).expect("park b.py");
        } else if files[0].ends_with("c.py") {
            fs::rename(&parked, &b).expect("return b.py");
        }
        true
    };

    let report = AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &oracle, None)?;
    let remediation = report.remediation.as_ref().expect("apply reports remediation");
    assert_eq!((remediation.remediated, remediation.failed), (2, 1));
    assert!(matches!(remediation.files[1].status, FileStatus::Failed { .. }));
    assert!(!report.success);

    assert_eq!(fs::read_to_string(&a)?, "a = 1\n");
    assert_eq!(fs::read_to_string(&b)?, "b = 2  # TODO remove\n");
    assert_eq!(fs::read_to_string(&c)?, "c = 3\n");

    let open = store.open_records()?;
    assert_eq!(open.len(), 1);
    assert!(open[0].key.file.ends_with("b.py"));
    Ok(())
}

#[test]
fn test_noop_suggestion_touches_nothing() -> Result<()> {
    let ws = Workspace::new()?;
    let original = "def f():\n    pass\n";
    let file = ws.write("stub.py", original)?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    let report = AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &passing, None)?;
    let remediation = report.remediation.expect("apply reports remediation");
    assert_eq!(remediation.unchanged, 1);
    assert_eq!(remediation.remediated, 0);
    assert_eq!(fs::read_to_string(&file)?, original);
    assert!(store.corrections(None)?.is_empty());
    assert_eq!(backup_count(backups.root()), 0);
    assert_eq!(store.open_records()?.len(), 1);
    Ok(())
}

#[test]
fn test_template_tokens_are_rewritten() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("page.html", "<h1>{{ TITLE }}</h1>\n<p>{{USER}}</p>\n")?;
    let mut config = AuditConfig::load_default()?;
    config.tasks.known_placeholders = vec!["USER".to_string()];
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    let report = AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &passing, None)?;
    assert_eq!(report.remediation.expect("apply reports remediation").remediated, 1);
    assert_eq!(fs::read_to_string(&file)?, "<h1></h1>\n<p>{{USER}}</p>\n");
    // The known token stays open; it is legitimate but still tracked.
    assert_eq!(store.open_records()?.len(), 1);
    Ok(())
}

#[test]
fn test_autofill_runs_as_its_own_correction() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("a.py", "x = 1  # TODO remove")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    let filler = TrailingNewlineFiller;
    AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &passing, Some(&filler as &dyn AutoFiller))?;
    assert_eq!(fs::read_to_string(&file)?, "x = 1\n");

    let corrections = store.corrections(None)?;
    assert_eq!(corrections.len(), 2);
    assert!(corrections.iter().all(|c| c.outcome == Outcome::Success));
    assert_eq!(backup_count(backups.root()), 2);
    Ok(())
}

#[test]
fn test_resolve_only_never_inserts() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("a.py", "# TODO one\n")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;

    AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;
    fs::write(&file, "# FIXME two\n")?;
    let report = AuditRun::new(&config, &mut store, ws.src.path())?.resolve()?;
    assert_eq!((report.inserted, report.resolved), (0, 1));
    assert_eq!(store.status_counts()?, (0, 1));
    Ok(())
}

#[test]
fn test_reappearing_key_gets_new_record() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("a.py", "# TODO one\n")?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;

    AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;
    fs::write(&file, "done\n")?;
    AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;
    fs::write(&file, "# TODO one\n")?;
    AuditRun::new(&config, &mut store, ws.src.path())?.scan()?;

    assert_eq!(store.total_records()?, 2);
    assert_eq!(store.status_counts()?, (1, 1));
    Ok(())
}

#[test]
fn test_rollback_last_and_by_id() -> Result<()> {
    let ws = Workspace::new()?;
    let original = "x = 1  # TODO remove\n";
    let file = ws.write("a.py", original)?;
    let config = AuditConfig::load_default()?;
    let mut store = ws.store()?;
    let backups = ws.backups()?;

    AuditRun::new(&config, &mut store, ws.src.path())?.apply(&backups, &passing, None)?;
    assert_eq!(fs::read_to_string(&file)?, "x = 1\n");

    let advisor = RollbackAdvisor::new(&store, &backups, config.rollback, "manual");
    let outcome = advisor.rollback_last()?;
    assert!(outcome.restored);
    assert_eq!(fs::read_to_string(&file)?, original);

    fs::write(&file, "edited\n")?;
    let correction_id = store.corrections(None)?[0].id;
    let outcome = advisor.rollback_by_id(correction_id)?;
    assert!(outcome.restored);
    assert_eq!(fs::read_to_string(&file)?, original);

    assert!(matches!(advisor.rollback_by_id(9999), Err(StubwatchError::NotFound(_))));
    assert_eq!(store.rollbacks(None)?.len(), 2);
    Ok(())
}

#[test]
fn test_failed_restores_escalate_to_manual_audit() -> Result<()> {
    let ws = Workspace::new()?;
    let file = ws.write("a.py", "x\n")?;
    let store = ws.store()?;
    let backups = ws.backups()?;
    let config = AuditConfig::load_default()?;
    let advisor = RollbackAdvisor::new(&store, &backups, config.rollback, "run");

    let missing = BackupRef::new(&file, ws.state.path().join("gone.bak"), "00");
    let first = advisor.restore(&missing, None)?;
    let second = advisor.restore(&missing, None)?;
    assert!(!first.restored);
    assert_eq!(first.strategy, RollbackStrategy::Standard);
    assert_eq!(second.strategy, RollbackStrategy::ManualAudit);

    let rollbacks = store.rollbacks(None)?;
    assert!(rollbacks.iter().all(|r| r.outcome == Outcome::Failure));
    Ok(())
}

#[test]
fn test_backup_root_inside_scan_root_is_refused() -> Result<()> {
    let ws = Workspace::new()?;
    let err = BackupManager::new(ws.src.path().join("backups"), ws.src.path()).unwrap_err();
    assert!(matches!(err, StubwatchError::BackupRootInsideScanRoot { .. }));
    Ok(())
}
