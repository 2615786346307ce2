// stubwatch/src/cli.rs
//! This file defines the command-line interface (CLI) for the stubwatch application,
//! including all available commands and their arguments.
//! License: MIT OR APACHE 2.0

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "stubwatch",
    author = "Obscura Team",
    version = env!("CARGO_PKG_VERSION"),
    about = "Track and remove placeholder markers from a source tree",
    long_about = "Stubwatch scans a source tree for unfinished-work markers (TODO, FIXME, bare `pass` bodies, unrendered template tokens and the like), keeps an audit history of every occurrence across runs, and removes them behind a backup and an external validator, rolling back any change the validator rejects.",
    arg_required_else_help = true,
)]
pub struct Cli {
    /// Disable informational messages
    #[arg(long, short = 'q', global = true, help = "Suppress all informational and debug messages.")]
    pub quiet: bool,

    /// Enable debug logging (overrides RUST_LOG to DEBUG)
    #[arg(long, short = 'd', global = true, help = "Enable debug logging.")]
    pub debug: bool,

    /// Explicitly disable debug logging, even if RUST_LOG is set to DEBUG
    #[arg(long = "disable-debug", global = true, help = "Disable debug logging, overriding RUST_LOG.")]
    pub disable_debug: bool,

    #[arg(long = "theme", value_name = "FILE", global = true, help = "Specify the path to a custom YAML theme file.")]
    pub theme: Option<PathBuf>,

    /// Location of the audit database.
    #[arg(long = "db", value_name = "FILE", env = "STUBWATCH_DB", global = true, help = "Path to the audit database (defaults to the platform data directory).")]
    pub db: Option<PathBuf>,

    /// Where pre-mutation backups are kept.
    #[arg(long = "backup-dir", value_name = "DIR", env = "STUBWATCH_BACKUP_DIR", global = true, help = "Directory for backups; must lie outside the scanned tree.")]
    pub backup_dir: Option<PathBuf>,

    #[arg(long = "config", value_name = "FILE", env = "STUBWATCH_CONFIG", global = true, help = "Path to a custom pattern configuration file (YAML).")]
    pub config: Option<PathBuf>,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// All available commands for the `stubwatch` CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Scans a tree, records placeholders and snapshots the totals without changing any file.")]
    Scan(ScanCommand),

    #[command(about = "Applies suggested fixes behind backups and a validator, rolling back rejected files.")]
    Apply(ApplyCommand),

    #[command(about = "Resolves records whose placeholder is gone. Never records new ones.")]
    Resolve(ResolveCommand),

    #[command(about = "Restores a file from the backup of a recorded correction.")]
    Rollback(RollbackCommand),

    #[command(about = "Prints stored history: tasks, snapshots, corrections, the dashboard summary and more.")]
    Report(ReportCommand),

    #[command(about = "Suggests a rollback strategy for a file from its restore history.")]
    Advise(AdviseCommand),
}

/// Options shared by every command that walks the tree.
#[derive(Args, Debug, Clone, Default)]
pub struct TreeArgs {
    /// Root of the tree to scan.
    #[arg(value_name = "PATH", default_value = ".", help = "Root of the source tree to scan.")]
    pub path: PathBuf,

    /// Explicitly enable only these pattern names (comma-separated).
    #[arg(long, short = 'e', value_delimiter = ',', help = "Enable these pattern names, including ones disabled by default (comma-separated).")]
    pub enable: Vec<String>,

    /// Explicitly disable these pattern names (comma-separated).
    #[arg(long, short = 'x', value_delimiter = ',', help = "Disable these pattern names (comma-separated).")]
    pub disable: Vec<String>,

    #[arg(long, value_delimiter = ',', value_name = "NAME", help = "Skip directories or files with these names, or root-relative paths (comma-separated).")]
    pub exclude: Vec<String>,

    #[arg(long, value_name = "SECS", help = "Stop scanning after this many seconds; a partial scan never resolves records.")]
    pub timeout: Option<u64>,
}

/// Arguments for the `scan` command.
#[derive(Parser, Debug)]
pub struct ScanCommand {
    #[command(flatten)]
    pub tree: TreeArgs,

    #[arg(long, short = 't', help = "List the generated removal tasks after the summary.")]
    pub tasks: bool,

    #[arg(long, help = "Print the run report as JSON on stdout.")]
    pub json: bool,
}

/// Arguments for the `apply` command.
#[derive(Parser, Debug)]
pub struct ApplyCommand {
    #[command(flatten)]
    pub tree: TreeArgs,

    /// Show a unified diff of every planned change and stop there.
    #[arg(long = "dry-run", short = 'n', help = "Print a unified diff of the planned changes without writing any file.")]
    pub dry_run: bool,

    /// Validator command line; the changed file paths are appended to it.
    #[arg(long, short = 'V', value_name = "COMMAND", env = "STUBWATCH_VALIDATOR", help = "Command that validates changed files (exit status 0 accepts). Required unless --dry-run.")]
    pub validator: Option<String>,

    #[arg(long, help = "After a successful remediation, normalise each file's trailing newline as a separate correction.")]
    pub autofill: bool,

    #[arg(long, help = "Print the run report as JSON on stdout.")]
    pub json: bool,
}

/// Arguments for the `resolve` command.
#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[command(flatten)]
    pub tree: TreeArgs,

    #[arg(long, help = "Print the run report as JSON on stdout.")]
    pub json: bool,
}

/// Arguments for the `rollback` command.
#[derive(Parser, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["last", "id"])))]
pub struct RollbackCommand {
    #[arg(long, help = "Restore the most recent successful correction that has a backup.")]
    pub last: bool,

    #[arg(long, value_name = "ID", help = "Restore the backup of the correction with this id.")]
    pub id: Option<i64>,

    #[arg(long, help = "Print the rollback outcome as JSON on stdout.")]
    pub json: bool,
}

/// The stored views `report` can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportView {
    /// Removal tasks for the current OPEN records.
    Tasks,
    /// Aggregate and density snapshots, oldest first.
    Snapshots,
    /// Correction and rollback entries, newest first.
    History,
    /// Every record, in the legacy tracking table shape.
    Tracking,
    /// The placeholder_summary.json dashboard shape.
    Dashboard,
    /// Corrections with a derived root-cause label.
    Corrections,
}

/// Arguments for the `report` command.
#[derive(Parser, Debug)]
pub struct ReportCommand {
    #[arg(value_enum, default_value = "tasks", help = "Which view to print.")]
    pub view: ReportView,

    #[arg(long, short = 'l', value_name = "N", help = "Only the N most recent entries.")]
    pub limit: Option<usize>,

    #[arg(long, value_name = "DIR", help = "For the dashboard view, also write placeholder_summary.json into DIR.")]
    pub out: Option<PathBuf>,

    #[arg(long, help = "Print JSON instead of a table.")]
    pub json: bool,
}

/// Arguments for the `advise` command.
#[derive(Parser, Debug)]
pub struct AdviseCommand {
    #[arg(value_name = "FILE", help = "File to advise on.")]
    pub file: PathBuf,

    #[arg(long, help = "Print the advice as JSON on stdout.")]
    pub json: bool,
}
