// stubwatch/src/ui/tables.rs
//! `comfy-table` renderings of runs, tasks and stored history.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use stubwatch_core::remediation::{AutofillStatus, FileStatus};
use stubwatch_core::report::{CorrectionSummary, FileAdvice, SnapshotSeries, TrackingRow};
use stubwatch_core::{RemediationReport, RollbackEntry, RunReport, Task};

const CONTEXT_WIDTH: usize = 60;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    table
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

/// Two-column summary of a run.
pub fn run_summary_table(report: &RunReport) -> Table {
    let mut table = new_table(&["Run", report.run_id.as_str()]);
    table.add_row(vec!["Files scanned".to_string(), report.files_scanned.to_string()]);
    table.add_row(vec!["Files skipped".to_string(), report.files_skipped.to_string()]);
    table.add_row(vec!["Findings".to_string(), report.findings.to_string()]);
    table.add_row(vec!["Records inserted".to_string(), report.inserted.to_string()]);
    table.add_row(vec!["Records resolved".to_string(), report.resolved.to_string()]);
    if let Some(snapshot) = &report.snapshot {
        table.add_row(vec!["Open".to_string(), snapshot.open_count.to_string()]);
        table.add_row(vec!["Resolved (total)".to_string(), snapshot.resolved_count.to_string()]);
    }
    if let Some(density) = &report.density {
        table.add_row(vec!["Open per 1000 lines".to_string(), format!("{:.2}", density.open_per_kloc)]);
    }
    if let Some(remediation) = &report.remediation {
        table.add_row(vec!["Files remediated".to_string(), remediation.remediated.to_string()]);
        table.add_row(vec!["Files rolled back".to_string(), remediation.rolled_back.to_string()]);
        table.add_row(vec!["Files failed".to_string(), remediation.failed.to_string()]);
        table.add_row(vec!["Verified resolved".to_string(), report.verified_resolved.to_string()]);
    }
    if report.timed_out {
        table.add_row(vec!["Scan".to_string(), "timed out (partial)".to_string()]);
    }
    table
}

pub fn tasks_table(tasks: &[Task]) -> Table {
    let mut table = new_table(&["Id", "File", "Line", "Pattern", "Context", "Suggestion"]);
    for task in tasks {
        table.add_row(vec![
            task.record_id.to_string(),
            task.file.clone(),
            task.line.to_string(),
            task.pattern.clone(),
            truncate(&task.context, CONTEXT_WIDTH),
            if task.is_actionable() {
                truncate(&task.suggestion, CONTEXT_WIDTH)
            } else {
                "(unchanged)".to_string()
            },
        ]);
    }
    table
}

pub fn remediation_table(report: &RemediationReport) -> Table {
    let mut table = new_table(&["File", "Status", "Applied", "Skipped", "Correction", "Autofill"]);
    for file in &report.files {
        let status = match &file.status {
            FileStatus::Remediated => "remediated".to_string(),
            FileStatus::RolledBack { restored: true, strategy } => format!("rolled back ({strategy})"),
            FileStatus::RolledBack { restored: false, strategy } => format!("restore FAILED ({strategy})"),
            FileStatus::Unchanged => "unchanged".to_string(),
            FileStatus::Failed { error } => format!("failed: {error}"),
        };
        let autofill = match file.autofill {
            Some(AutofillStatus::Applied) => "applied",
            Some(AutofillStatus::RolledBack) => "rolled back",
            Some(AutofillStatus::RestoreFailed) => "restore FAILED",
            Some(AutofillStatus::Failed) => "failed",
            None => "-",
        };
        table.add_row(vec![
            file.file.clone(),
            status,
            file.applied.to_string(),
            file.skipped.len().to_string(),
            file.correction_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            autofill.to_string(),
        ]);
    }
    table
}

pub fn snapshots_table(series: &SnapshotSeries) -> Table {
    let mut table = new_table(&["Taken at", "Run", "Open", "Resolved", "Open/kloc"]);
    for snapshot in &series.snapshots {
        let density = series
            .density
            .iter()
            .find(|d| d.run_id == snapshot.run_id)
            .map_or_else(|| "-".to_string(), |d| format!("{:.2}", d.open_per_kloc));
        table.add_row(vec![
            snapshot.taken_at.clone(),
            snapshot.run_id.clone(),
            snapshot.open_count.to_string(),
            snapshot.resolved_count.to_string(),
            density,
        ]);
    }
    table
}

pub fn tracking_table(rows: &[TrackingRow]) -> Table {
    let mut table = new_table(&["Id", "File", "Line", "Type", "Status", "Created", "Resolved at"]);
    for row in rows {
        table.add_row(vec![
            row.removal_id.to_string(),
            row.file_path.clone(),
            row.line_number.to_string(),
            row.placeholder_type.clone(),
            row.status.clone(),
            row.timestamp.clone(),
            or_dash(row.resolved_timestamp.as_deref()),
        ]);
    }
    table
}

pub fn corrections_table(summary: &CorrectionSummary) -> Table {
    let mut table = new_table(&["Id", "File", "Kind", "Outcome", "Root cause", "Rationale", "Backup"]);
    for item in &summary.corrections {
        table.add_row(vec![
            item.id.to_string(),
            item.file_path.clone(),
            item.kind.as_str().to_string(),
            item.outcome.to_string(),
            item.root_cause.to_string(),
            truncate(&item.rationale, CONTEXT_WIDTH),
            or_dash(item.backup_path.as_deref()),
        ]);
    }
    table
}

pub fn rollbacks_table(entries: &[RollbackEntry]) -> Table {
    let mut table = new_table(&["Id", "File", "Correction", "Outcome", "Detail", "At"]);
    for entry in entries {
        table.add_row(vec![
            entry.id.to_string(),
            entry.file.clone(),
            entry.correction_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            entry.outcome.to_string(),
            truncate(&entry.detail, CONTEXT_WIDTH),
            entry.created_at.clone(),
        ]);
    }
    table
}

pub fn advice_table(advice: &FileAdvice) -> Table {
    let mut table = new_table(&["File", advice.file.as_str()]);
    table.add_row(vec!["Successful restores".to_string(), advice.counts.successes.to_string()]);
    table.add_row(vec!["Failed restores".to_string(), advice.counts.failures.to_string()]);
    table.add_row(vec!["Strategy".to_string(), advice.strategy.to_string()]);
    table.add_row(vec!["Advice".to_string(), advice.advice.to_string()]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
