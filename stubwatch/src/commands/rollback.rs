// stubwatch/src/commands/rollback.rs
//! `stubwatch rollback --last | --id N`: restore a file from the backup of a
//! recorded correction. Every attempt is written to the rollback history.

use anyhow::{Context, Result};

use stubwatch_core::{BackupManager, RollbackAdvisor};

use crate::cli::RollbackCommand;
use crate::commands::{print_json, CommandContext, CommandError};

pub fn run_rollback(ctx: &CommandContext, cmd: &RollbackCommand) -> Result<()> {
    let config = ctx.load_config(None)?;
    let backups = BackupManager::for_restore(ctx.backup_dir()?);
    let store = ctx.open_store()?;
    let run_id = format!("rollback-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"));

    let advisor = RollbackAdvisor::new(&store, &backups, config.rollback, &run_id);
    let outcome = match cmd.id {
        Some(id) => advisor
            .rollback_by_id(id)
            .with_context(|| format!("Rollback of correction {id} failed"))?,
        None => advisor.rollback_last().context("Rollback of the last correction failed")?,
    };

    if cmd.json {
        print_json(&outcome)?;
    }
    if !outcome.restored {
        return Err(CommandError::RestoreFailed {
            file: outcome.file.display().to_string(),
            detail: outcome.detail,
        }
        .into());
    }
    ctx.success(format!("Restored {}.", outcome.file.display()));
    ctx.info(format!("Suggested strategy: {} ({}).", outcome.strategy, outcome.strategy.advice()));
    Ok(())
}
