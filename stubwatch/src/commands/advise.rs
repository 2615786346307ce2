// stubwatch/src/commands/advise.rs
//! `stubwatch advise FILE`: rollback strategy advice from restore history.

use anyhow::Result;

use stubwatch_core::report::advice_for;

use crate::cli::AdviseCommand;
use crate::commands::{print_json, CommandContext};
use crate::ui::tables;

pub fn run_advise(ctx: &CommandContext, cmd: &AdviseCommand) -> Result<()> {
    let config = ctx.load_config(None)?;
    let store = ctx.open_store()?;
    // Records and rollback entries key files by canonical absolute path.
    let file = cmd.file.canonicalize().unwrap_or_else(|_| cmd.file.clone());
    let advice = advice_for(&store, config.rollback, &file.to_string_lossy())?;

    if cmd.json {
        print_json(&advice)?;
    } else {
        println!("{}", tables::advice_table(&advice));
    }
    Ok(())
}
