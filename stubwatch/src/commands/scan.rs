// stubwatch/src/commands/scan.rs
//! `stubwatch scan`: record placeholders and snapshot the totals. Never
//! touches a scanned file.

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use stubwatch_core::{AuditRun, RunReport, Task};

use crate::cli::ScanCommand;
use crate::commands::{ensure_dir, print_json, CommandContext};
use crate::ui::tables;

#[derive(Serialize)]
struct ScanOutput<'a> {
    report: &'a RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<&'a [Task]>,
}

pub fn run_scan(ctx: &CommandContext, cmd: &ScanCommand) -> Result<()> {
    ensure_dir(&cmd.tree.path)?;
    let config = ctx.load_config(Some(&cmd.tree))?;
    let backup_dir = ctx.backup_dir().ok();
    let mut store = ctx.open_store()?;

    let mut run = AuditRun::new(&config, &mut store, &cmd.tree.path).context("Failed to start run")?;
    if let Some(dir) = backup_dir {
        run = run.exclude(dir);
    }
    info!("Scanning {}", cmd.tree.path.display());
    let report = run.scan().context("Scan failed")?;
    let tasks = if cmd.tasks { Some(run.tasks()?) } else { None };

    if cmd.json {
        print_json(&ScanOutput {
            report: &report,
            tasks: tasks.as_deref(),
        })?;
    } else {
        println!("{}", tables::run_summary_table(&report));
        if let Some(tasks) = &tasks {
            if tasks.is_empty() {
                ctx.info("No open placeholders.");
            } else {
                println!("{}", tables::tasks_table(tasks));
            }
        }
    }

    ctx.report_scan_caveats(&report);
    if !report.validated {
        ctx.warn("Some findings have no matching record; run `stubwatch scan` again to repair the store.");
    }
    ctx.success(format!(
        "Scan complete: {} finding(s), {} new record(s), {} resolved.",
        report.findings, report.inserted, report.resolved
    ));
    Ok(())
}
