// stubwatch/src/commands/apply.rs
//! `stubwatch apply`: remediate OPEN records behind backups and a validator.
//!
//! With `--dry-run` the audit still runs (records and the snapshot are
//! written as for `scan`), but no file is touched and no correction or
//! rollback is recorded; the planned changes are printed as a unified diff.

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use log::info;
use serde::Serialize;
use std::io;

use stubwatch_core::remediation::{AutofillStatus, FileStatus, SkipReason};
use stubwatch_core::{
    AuditRun, AutoFiller, BackupManager, CommandOracle, FilePreview, RunReport, TrailingNewlineFiller,
};

use crate::cli::ApplyCommand;
use crate::commands::{ensure_dir, print_json, CommandContext, CommandError};
use crate::ui::{diff_viewer, tables};

#[derive(Serialize)]
struct DryRunOutput<'a> {
    report: &'a RunReport,
    previews: &'a [FilePreview],
}

pub fn run_apply(ctx: &CommandContext, cmd: &ApplyCommand) -> Result<()> {
    ensure_dir(&cmd.tree.path)?;
    if cmd.dry_run {
        return run_dry_run(ctx, cmd);
    }

    let oracle = cmd
        .validator
        .as_deref()
        .and_then(CommandOracle::from_command_line)
        .ok_or(CommandError::MissingValidator)?;
    let config = ctx.load_config(Some(&cmd.tree))?;
    let backups = BackupManager::new(ctx.backup_dir()?, &cmd.tree.path).context("Backup directory rejected")?;
    let mut store = ctx.open_store()?;

    let filler = TrailingNewlineFiller;
    let autofiller = cmd.autofill.then_some(&filler as &dyn AutoFiller);

    let mut run = AuditRun::new(&config, &mut store, &cmd.tree.path)
        .context("Failed to start run")?
        .exclude(backups.root());
    info!("Applying suggestions under {}", cmd.tree.path.display());
    let report = run.apply(&backups, &oracle, autofiller).context("Apply failed")?;

    if cmd.json {
        print_json(&report)?;
    } else {
        println!("{}", tables::run_summary_table(&report));
        if let Some(remediation) = &report.remediation {
            if !remediation.files.is_empty() {
                println!("{}", tables::remediation_table(remediation));
            }
        }
    }
    ctx.report_scan_caveats(&report);

    let remediation = report.remediation.as_ref();
    let unrestored = remediation.map_or(0, |r| {
        r.files
            .iter()
            .filter(|f| {
                matches!(f.status, FileStatus::RolledBack { restored: false, .. })
                    || f.autofill == Some(AutofillStatus::RestoreFailed)
            })
            .count()
    });
    if !report.success {
        return Err(CommandError::RunFailed {
            run_id: report.run_id.clone(),
            failed: remediation.map_or(0, |r| r.failed),
            unrestored,
        }
        .into());
    }

    if let Some(r) = remediation {
        if r.rolled_back > 0 {
            ctx.warn(format!("{} file(s) rejected by the validator and restored.", r.rolled_back));
        }
        ctx.success(format!(
            "{} file(s) remediated, {} record(s) resolved.",
            r.remediated, report.verified_resolved
        ));
    }
    Ok(())
}

fn run_dry_run(ctx: &CommandContext, cmd: &ApplyCommand) -> Result<()> {
    let config = ctx.load_config(Some(&cmd.tree))?;
    let backup_dir = ctx.backup_dir().ok();
    let mut store = ctx.open_store()?;

    let mut run = AuditRun::new(&config, &mut store, &cmd.tree.path).context("Failed to start run")?;
    if let Some(dir) = backup_dir {
        run = run.exclude(dir);
    }
    let (report, previews) = run.preview().context("Dry run failed")?;

    if cmd.json {
        return print_json(&DryRunOutput {
            report: &report,
            previews: &previews,
        });
    }

    let stdout = io::stdout();
    let supports_color = stdout.is_terminal();
    let mut writer = stdout.lock();
    let mut changed = 0;
    for preview in &previews {
        if diff_viewer::print_diff(
            &preview.file,
            &preview.original,
            &preview.remediated,
            &mut writer,
            &ctx.theme,
            supports_color,
        )? {
            changed += 1;
        }
        for skipped in &preview.skipped {
            let why = match skipped.reason {
                SkipReason::LineOutOfRange => "the file is now shorter than the recorded line",
                SkipReason::Stale => "the line no longer matches the record",
            };
            ctx.warn(format!("{}:{} skipped: {}.", preview.file, skipped.line, why));
        }
    }
    drop(writer);

    ctx.report_scan_caveats(&report);
    ctx.info(format!("Dry run: {changed} file(s) would change. No file was written."));
    Ok(())
}
