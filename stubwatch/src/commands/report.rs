// stubwatch/src/commands/report.rs
//! `stubwatch report VIEW`: read-only views over the audit store.

use anyhow::Result;
use is_terminal::IsTerminal;
use std::io;

use stubwatch_core::report::{
    correction_summary, dashboard_summary, history, snapshot_series, tracking_view, write_dashboard,
    ProgressStatus,
};
use stubwatch_core::{get_or_compile_patterns, TaskGenerator, TemplateTokenRewriter};

use crate::cli::{ReportCommand, ReportView};
use crate::commands::{print_json, CommandContext};
use crate::ui::output_format::paint;
use crate::ui::tables;
use crate::ui::theme::ThemeEntry;

/// Correction entries shown when no `--limit` is given.
const DEFAULT_CORRECTION_LIMIT: usize = 50;

pub fn run_report(ctx: &CommandContext, cmd: &ReportCommand) -> Result<()> {
    let store = ctx.open_store()?;

    match cmd.view {
        ReportView::Tasks => {
            let config = ctx.load_config(None)?;
            let patterns = get_or_compile_patterns(&config.active_patterns())?;
            let rewriter = TemplateTokenRewriter::new(config.tasks.known_placeholders.iter().cloned());
            let mut tasks = TaskGenerator::new(&patterns, &config.tasks)
                .with_rewriter(&rewriter)
                .generate(&store.open_records()?)?;
            if let Some(limit) = cmd.limit {
                tasks.truncate(limit);
            }
            if cmd.json {
                print_json(&tasks)?;
            } else if tasks.is_empty() {
                ctx.info("No open placeholders.");
            } else {
                println!("{}", tables::tasks_table(&tasks));
            }
        }
        ReportView::Snapshots => {
            let series = snapshot_series(&store, cmd.limit)?;
            if cmd.json {
                print_json(&series)?;
            } else {
                println!("{}", tables::snapshots_table(&series));
            }
        }
        ReportView::History => {
            let history = history(&store, cmd.limit)?;
            if cmd.json {
                print_json(&history)?;
            } else {
                let summary = correction_summary(&store, cmd.limit.unwrap_or(DEFAULT_CORRECTION_LIMIT))?;
                println!("{}", tables::corrections_table(&summary));
                println!("{}", tables::rollbacks_table(&history.rollbacks));
            }
        }
        ReportView::Tracking => {
            let mut rows = tracking_view(&store)?;
            if let Some(limit) = cmd.limit {
                rows.truncate(limit);
            }
            if cmd.json {
                print_json(&rows)?;
            } else {
                println!("{}", tables::tracking_table(&rows));
            }
        }
        ReportView::Dashboard => {
            let summary = dashboard_summary(&store)?;
            if let Some(dir) = &cmd.out {
                let path = write_dashboard(&store, dir)?;
                ctx.info(format!("Dashboard summary written to {}", path.display()));
            }
            if cmd.json {
                print_json(&summary)?;
            } else {
                let color = io::stdout().is_terminal();
                let status = match summary.progress_status {
                    ProgressStatus::Complete => "complete",
                    ProgressStatus::IssuesPending => "issues pending",
                };
                println!(
                    "{} open, {} resolved ({status})",
                    paint(&summary.findings.to_string(), ThemeEntry::OpenCount, &ctx.theme, color),
                    paint(&summary.resolved_count.to_string(), ThemeEntry::ResolvedCount, &ctx.theme, color),
                );
            }
        }
        ReportView::Corrections => {
            let summary = correction_summary(&store, cmd.limit.unwrap_or(DEFAULT_CORRECTION_LIMIT))?;
            if cmd.json {
                print_json(&summary)?;
            } else {
                println!("{}", tables::corrections_table(&summary));
                ctx.info(format!(
                    "{} correction(s): {} succeeded, {} failed.",
                    summary.total_corrections, summary.successes, summary.failures
                ));
            }
        }
    }
    Ok(())
}
