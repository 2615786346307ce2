// stubwatch/src/commands/mod.rs
//! Subcommand implementations and the plumbing they share: locating the
//! store and backup directory, loading configuration, and themed output.
//! License: MIT OR APACHE 2.0

pub mod advise;
pub mod apply;
pub mod report;
pub mod resolve;
pub mod rollback;
pub mod scan;

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use log::debug;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use stubwatch_core::{merge_config, AuditConfig, AuditStore, RunReport, UserConfig};

use crate::cli::{Cli, TreeArgs};
use crate::ui::output_format;
use crate::ui::theme::ThemeMap;

/// File name of the audit database inside the data directory.
pub const DB_FILE_NAME: &str = "audit.db";
/// Directory name of the backup root inside the data directory.
pub const BACKUP_DIR_NAME: &str = "backups";

/// Failures the CLI reports on its own, as opposed to errors from the core.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No platform data directory is available; pass --db and --backup-dir (or set STUBWATCH_DB and STUBWATCH_BACKUP_DIR).")]
    NoDataDir,
    #[error("Scan root {0} is not a directory.")]
    NotADirectory(PathBuf),
    #[error("`apply` needs a validator command; pass --validator (or set STUBWATCH_VALIDATOR), or use --dry-run.")]
    MissingValidator,
    #[error("Run {run_id} finished with {failed} failed file(s) and {unrestored} file(s) that could not be restored.")]
    RunFailed {
        run_id: String,
        failed: usize,
        unrestored: usize,
    },
    #[error("Rollback of {file} did not restore the file: {detail}")]
    RestoreFailed { file: String, detail: String },
}

/// Helper for printing info messages to stderr.
pub fn info_msg(msg: impl AsRef<str>, theme: &ThemeMap) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_info_message(&mut io::stderr(), msg.as_ref(), theme, stderr_supports_color);
}

/// Helper for printing success messages to stderr.
pub fn success_msg(msg: impl AsRef<str>, theme: &ThemeMap) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_success_message(&mut io::stderr(), msg.as_ref(), theme, stderr_supports_color);
}

/// Helper for printing warning messages to stderr.
pub fn warn_msg(msg: impl AsRef<str>, theme: &ThemeMap) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_warn_message(&mut io::stderr(), msg.as_ref(), theme, stderr_supports_color);
}

/// Helper for printing error messages to stderr.
pub fn error_msg(msg: impl AsRef<str>, theme: &ThemeMap) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_error_message(&mut io::stderr(), msg.as_ref(), theme, stderr_supports_color);
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output as JSON")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

/// Everything a subcommand needs from the global flags.
pub struct CommandContext {
    pub theme: ThemeMap,
    pub quiet: bool,
    db: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl CommandContext {
    pub fn from_cli(cli: &Cli, theme: ThemeMap) -> Self {
        Self {
            theme,
            quiet: cli.quiet,
            db: cli.db.clone(),
            backup_dir: cli.backup_dir.clone(),
            config: cli.config.clone(),
        }
    }

    fn data_dir() -> Result<PathBuf, CommandError> {
        dirs::data_dir()
            .map(|dir| dir.join("stubwatch"))
            .ok_or(CommandError::NoDataDir)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.db {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join(DB_FILE_NAME)),
        }
    }

    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join(BACKUP_DIR_NAME)),
        }
    }

    pub fn open_store(&self) -> Result<AuditStore> {
        let path = self.db_path()?;
        debug!("Opening audit store at {}", path.display());
        AuditStore::open(&path).with_context(|| format!("Failed to open audit store at {}", path.display()))
    }

    /// Defaults merged with the user file, then narrowed by the tree flags.
    pub fn load_config(&self, tree: Option<&TreeArgs>) -> Result<AuditConfig> {
        let defaults = AuditConfig::load_default().context("Failed to load default configuration")?;
        let user = match &self.config {
            Some(path) => {
                self.info(format!("Loading configuration from {}", path.display()));
                Some(UserConfig::load_from_file(path)?)
            }
            None => None,
        };
        let mut config = merge_config(defaults, user);

        if let Some(tree) = tree {
            config.set_active_patterns(&tree.enable, &tree.disable);
            config.scan.exclude.extend(tree.exclude.iter().cloned());
            if tree.timeout.is_some() {
                config.scan.timeout_secs = tree.timeout;
            }
        }
        Ok(config)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            info_msg(msg, &self.theme);
        }
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            success_msg(msg, &self.theme);
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        warn_msg(msg, &self.theme);
    }

    /// Warnings every tree-walking command shares.
    pub fn report_scan_caveats(&self, report: &RunReport) {
        if report.timed_out {
            self.warn("The scan hit its time budget; records of unscanned files were left OPEN.");
        }
        if report.files_skipped > 0 {
            self.info(format!("{} unreadable or binary file(s) skipped.", report.files_skipped));
        }
    }
}

/// Rejects scan roots that are not directories before anything is written.
pub fn ensure_dir(path: &Path) -> Result<(), CommandError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(CommandError::NotADirectory(path.to_path_buf()))
    }
}
