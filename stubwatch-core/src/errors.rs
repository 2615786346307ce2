//! errors.rs - Custom error types for the stubwatch-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//! Store errors are fatal for a run; I/O and backup errors are usually
//! caught per file by the remediator.
//!
//! License: MIT OR APACHE 2.0

use std::path::PathBuf;
use thiserror::Error;

/// All error types produced by the `stubwatch-core` library.
///
/// Marked `#[non_exhaustive]` so new variants can be added without breaking
/// downstream matches.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StubwatchError {
    #[error("Failed to compile pattern '{0}': {1}")]
    PatternCompilationError(String, regex::Error),

    #[error("Pattern '{0}': length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    #[error("Record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup root {backup_root} lies inside the scan root {scan_root}; refusing to operate")]
    BackupRootInsideScanRoot {
        backup_root: PathBuf,
        scan_root: PathBuf,
    },

    #[error("Backup {0} is missing")]
    BackupMissing(PathBuf),

    #[error("Backup {path} is corrupt: expected sha256 {expected}, found {actual}")]
    BackupCorrupt {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unknown record status '{0}'")]
    InvalidStatus(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to render template: {0}")]
    Template(String),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}

impl StubwatchError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StubwatchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the store and backup layers.
pub type StubwatchResult<T> = Result<T, StubwatchError>;
