// stubwatch/tests/cli_integration_tests.rs
//! Command-line integration tests for the `stubwatch` binary.
//!
//! Every test gets two temporary directories: `src`, the tree that is
//! scanned, and `state`, which holds the audit database and the backup root
//! (pointed at through `STUBWATCH_DB` and `STUBWATCH_BACKUP_DIR`). The binary
//! runs with `state` as its working directory so no stray `.env` is read.
//!
//! Output is stripped of ANSI escapes before assertions.

use anyhow::Result;
#[allow(unused_imports)] // Used for `Command::cargo_bin` and `assert` method
use assert_cmd::prelude::*;
use assert_cmd::Command;
#[allow(unused_imports)] // This is often used by `predicates::str::contains`
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};
use test_log::test; // For integrating with `env_logger` in tests

use strip_ansi_escapes::strip as strip_ansi_escapes_fn;

const ORIGINAL: &str = "x = 1  # TODO remove\n";

struct Fixture {
    src: TempDir,
    state: TempDir,
}

impl Fixture {
    fn new() -> Result<Self> {
        let fixture = Self {
            src: tempdir()?,
            state: tempdir()?,
        };
        fs::write(fixture.file(), ORIGINAL)?;
        Ok(fixture)
    }

    fn file(&self) -> PathBuf {
        self.src.path().join("a.py")
    }

    fn src_arg(&self) -> String {
        self.src.path().display().to_string()
    }

    /// A `stubwatch` command wired to this fixture's state directory.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("stubwatch").unwrap();
        cmd.current_dir(self.state.path())
            .env("RUST_LOG", "debug")
            .env("STUBWATCH_DB", self.state.path().join("audit.db"))
            .env("STUBWATCH_BACKUP_DIR", self.state.path().join("backups"))
            .env_remove("STUBWATCH_CONFIG")
            .env_remove("STUBWATCH_VALIDATOR");
        cmd
    }
}

fn strip_ansi(bytes: &[u8]) -> String {
    let cleaned = strip_ansi_escapes_fn(bytes);
    String::from_utf8_lossy(&cleaned).to_string()
}

fn stdout_json(output: &std::process::Output) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&strip_ansi(&output.stdout))?)
}

#[test]
fn test_scan_reports_findings_as_json() -> Result<()> {
    let fx = Fixture::new()?;
    let output = fx.cmd().args(["scan", &fx.src_arg(), "--json", "--tasks"]).output()?;
    assert!(output.status.success(), "stderr: {}", strip_ansi(&output.stderr));

    let json = stdout_json(&output)?;
    assert_eq!(json["report"]["findings"], 1);
    assert_eq!(json["report"]["inserted"], 1);
    assert_eq!(json["report"]["snapshot"]["open_count"], 1);
    assert_eq!(json["tasks"][0]["suggestion"], "x = 1");
    assert_eq!(fs::read_to_string(fx.file())?, ORIGINAL);
    Ok(())
}

#[test]
fn test_second_scan_inserts_nothing() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd().args(["scan", &fx.src_arg()]).assert().success();
    let output = fx.cmd().args(["scan", &fx.src_arg(), "--json"]).output()?;
    assert!(output.status.success());

    let json = stdout_json(&output)?;
    assert_eq!(json["report"]["inserted"], 0);
    assert_eq!(json["report"]["resolved"], 0);
    Ok(())
}

#[test]
fn test_scan_missing_root_fails() -> Result<()> {
    let fx = Fixture::new()?;
    let missing = fx.src.path().join("nope").display().to_string();
    fx.cmd()
        .args(["scan", &missing])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
    Ok(())
}

#[test]
fn test_apply_dry_run_prints_diff_and_leaves_file() -> Result<()> {
    let fx = Fixture::new()?;
    let output = fx.cmd().args(["apply", &fx.src_arg(), "--dry-run"]).output()?;
    assert!(output.status.success(), "stderr: {}", strip_ansi(&output.stderr));

    let stdout = strip_ansi(&output.stdout);
    assert!(stdout.contains("-x = 1  # TODO remove"), "stdout: {stdout}");
    assert!(stdout.contains("+x = 1"), "stdout: {stdout}");
    assert!(strip_ansi(&output.stderr).contains("1 file(s) would change"));
    assert_eq!(fs::read_to_string(fx.file())?, ORIGINAL);
    assert!(!fx.state.path().join("backups").exists());
    Ok(())
}

#[test]
fn test_apply_requires_validator() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd()
        .args(["apply", &fx.src_arg()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("needs a validator"));
    assert_eq!(fs::read_to_string(fx.file())?, ORIGINAL);
    Ok(())
}

#[test]
fn test_backup_dir_inside_scan_root_is_refused() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd()
        .env("STUBWATCH_BACKUP_DIR", fx.src.path().join("backups"))
        .args(["apply", &fx.src_arg(), "--validator", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Backup directory rejected"));
    assert_eq!(fs::read_to_string(fx.file())?, ORIGINAL);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_apply_with_accepting_validator_rewrites_file() -> Result<()> {
    let fx = Fixture::new()?;
    let output = fx.cmd().args(["apply", &fx.src_arg(), "--validator", "true", "--json"]).output()?;
    assert!(output.status.success(), "stderr: {}", strip_ansi(&output.stderr));

    let json = stdout_json(&output)?;
    assert_eq!(json["remediation"]["remediated"], 1);
    assert_eq!(json["verified_resolved"], 1);
    assert_eq!(fs::read_to_string(fx.file())?, "x = 1\n");

    let output = fx.cmd().args(["report", "corrections", "--json"]).output()?;
    let summary = stdout_json(&output)?;
    assert_eq!(summary["total_corrections"], 1);
    assert_eq!(summary["corrections"][0]["outcome"], "success");

    let output = fx.cmd().args(["report", "dashboard", "--json"]).output()?;
    assert_eq!(stdout_json(&output)?["progress_status"], "complete");
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_apply_with_rejecting_validator_restores_file() -> Result<()> {
    let fx = Fixture::new()?;
    let output = fx.cmd().args(["apply", &fx.src_arg(), "--validator", "false", "--json"]).output()?;
    assert!(output.status.success(), "stderr: {}", strip_ansi(&output.stderr));

    let json = stdout_json(&output)?;
    assert_eq!(json["remediation"]["rolled_back"], 1);
    assert_eq!(fs::read_to_string(fx.file())?, ORIGINAL);

    let output = fx.cmd().args(["report", "history", "--json"]).output()?;
    let history = stdout_json(&output)?;
    assert_eq!(history["corrections"][0]["outcome"], "failure");
    assert_eq!(history["rollbacks"][0]["outcome"], "success");

    let advise = fx.cmd().args(["advise", &fx.file().display().to_string(), "--json"]).output()?;
    let advice = stdout_json(&advise)?;
    assert_eq!(advice["counts"]["successes"], 1);
    assert_eq!(advice["strategy"], "standard");
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_rollback_last_restores_original() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd().args(["apply", &fx.src_arg(), "--validator", "true"]).assert().success();
    assert_eq!(fs::read_to_string(fx.file())?, "x = 1\n");

    // The working directory contains the backup root; restores must not care.
    fx.cmd()
        .args(["rollback", "--last"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Restored"));
    assert_eq!(fs::read_to_string(fx.file())?, ORIGINAL);
    Ok(())
}

#[test]
fn test_rollback_unknown_id_fails() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd()
        .args(["rollback", "--id", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Rollback of correction 42 failed"));
    Ok(())
}

#[test]
fn test_rollback_requires_a_target() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd().args(["rollback"]).assert().failure();
    Ok(())
}

#[test]
fn test_report_dashboard_writes_summary_file() -> Result<()> {
    let fx = Fixture::new()?;
    fx.cmd().args(["scan", &fx.src_arg()]).assert().success();

    let out_dir = fx.state.path().join("dashboard");
    let output = fx
        .cmd()
        .args(["report", "dashboard", "--json", "--out", &out_dir.display().to_string()])
        .output()?;
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)?["progress_status"], "issues_pending");

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("placeholder_summary.json"))?)?;
    assert_eq!(written["findings"], 1);
    assert_eq!(written["resolved_count"], 0);
    Ok(())
}

#[test]
fn test_disabled_pattern_is_not_recorded() -> Result<()> {
    let fx = Fixture::new()?;
    let output = fx.cmd().args(["scan", &fx.src_arg(), "--disable", "todo", "--json"]).output()?;
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)?["report"]["findings"], 0);
    Ok(())
}
