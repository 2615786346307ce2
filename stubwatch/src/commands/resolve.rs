// stubwatch/src/commands/resolve.rs
//! `stubwatch resolve`: mark records RESOLVED when their placeholder is gone.

use anyhow::{Context, Result};

use stubwatch_core::AuditRun;

use crate::cli::ResolveCommand;
use crate::commands::{ensure_dir, print_json, CommandContext};
use crate::ui::tables;

pub fn run_resolve(ctx: &CommandContext, cmd: &ResolveCommand) -> Result<()> {
    ensure_dir(&cmd.tree.path)?;
    let config = ctx.load_config(Some(&cmd.tree))?;
    let backup_dir = ctx.backup_dir().ok();
    let mut store = ctx.open_store()?;

    let mut run = AuditRun::new(&config, &mut store, &cmd.tree.path).context("Failed to start run")?;
    if let Some(dir) = backup_dir {
        run = run.exclude(dir);
    }
    let report = run.resolve().context("Resolve pass failed")?;

    if cmd.json {
        print_json(&report)?;
    } else {
        println!("{}", tables::run_summary_table(&report));
    }
    ctx.report_scan_caveats(&report);
    ctx.success(format!("{} record(s) resolved.", report.resolved));
    Ok(())
}
