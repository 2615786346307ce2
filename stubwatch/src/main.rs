// stubwatch/src/main.rs
//! stubwatch entry point.
//!
//! Loads `.env`, parses the command line, initialises logging and the theme,
//! then dispatches to the chosen subcommand. Any error ends the process with
//! exit status 1 after a themed message on stderr.

use anyhow::{Context, Result};
use clap::Parser;

use stubwatch::cli::{Cli, Commands};
use stubwatch::commands::{self, error_msg, CommandContext};
use stubwatch::logger;
use stubwatch::ui::theme::{build_theme_map, ThemeStyle};

fn run(cli: Cli) -> Result<()> {
    let theme = build_theme_map(cli.theme.as_ref()).context("Theme error")?;
    let ctx = CommandContext::from_cli(&cli, theme);

    match &cli.command {
        Commands::Scan(cmd) => commands::scan::run_scan(&ctx, cmd),
        Commands::Apply(cmd) => commands::apply::run_apply(&ctx, cmd),
        Commands::Resolve(cmd) => commands::resolve::run_resolve(&ctx, cmd),
        Commands::Rollback(cmd) => commands::rollback::run_rollback(&ctx, cmd),
        Commands::Report(cmd) => commands::report::run_report(&ctx, cmd),
        Commands::Advise(cmd) => commands::advise::run_advise(&ctx, cmd),
    }
}

fn main() {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logger::init_logger(logger::level_from_flags(cli.quiet, cli.debug, cli.disable_debug));

    if let Err(err) = run(cli) {
        log::debug!("Command failed: {:?}", err);
        error_msg(format!("{err:#}"), &ThemeStyle::default_theme_map());
        std::process::exit(1);
    }
}
