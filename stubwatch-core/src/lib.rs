// stubwatch-core/src/lib.rs
//! # stubwatch Core Library
//!
//! `stubwatch-core` tracks "unfinished work" markers (TODO, FIXME, bare `pass`
//! bodies, unrendered template tokens, ...) across a source tree over many
//! runs, and removes them under a validate-or-rollback safety gate.
//!
//! The library persists every placeholder occurrence as a record with an
//! OPEN/RESOLVED lifecycle in a SQLite store, snapshots aggregate counts once
//! per run, projects open records into removal tasks with suggested fixes,
//! and applies those fixes file by file behind a backup and an external
//! validation oracle.
//!
//! ## Modules
//!
//! * `config`: `PatternRule`s and `AuditConfig`, loaded from YAML, merged and validated.
//! * `patterns`: Compilation and process-wide caching of scan patterns.
//! * `scanner`: Deterministic tree walk producing `Finding`s.
//! * `store`: The SQLite record store and its row types.
//! * `reconcile`: Diffing findings against stored records.
//! * `snapshot`: Run-scoped snapshots of aggregate counts.
//! * `tasks`: Task generation and suggestion strategies.
//! * `backup`: Pre-mutation backups and the `MutationGuard`.
//! * `oracle`: The `ValidationOracle` trait and `CommandOracle`.
//! * `remediation`: Guarded application of suggestions.
//! * `rollback`: Restores and rollback strategy advice.
//! * `run`: `AuditRun`, which sequences one invocation.
//! * `report`: Read-only serialisable views (dashboard, history, legacy tracking view).
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use stubwatch_core::{AuditConfig, AuditRun, AuditStore, BackupManager};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AuditConfig::load_default()?;
//!     let mut store = AuditStore::open("/var/lib/stubwatch/audit.db")?;
//!     let backups = BackupManager::new("/var/lib/stubwatch/backups", "./src")?;
//!
//!     let mut run = AuditRun::new(&config, &mut store, "./src")?;
//!     let oracle = |_files: &[PathBuf]| true;
//!     let report = run.apply(&backups, &oracle, None)?;
//!     println!("{} remediated", report.remediation.map_or(0, |r| r.remediated));
//!     Ok(())
//! }
//! ```
//!
//! License: MIT OR APACHE 2.0

pub mod backup;
pub mod config;
pub mod errors;
pub mod finding;
pub mod oracle;
pub mod patterns;
pub mod reconcile;
pub mod remediation;
pub mod report;
pub mod rollback;
pub mod run;
pub mod scanner;
pub mod snapshot;
pub mod store;
pub mod tasks;

pub use backup::{BackupManager, BackupRef, MutationGuard};
pub use config::{merge_config, AuditConfig, PatternKind, PatternRule, RollbackThresholds, UserConfig};
pub use errors::{StubwatchError, StubwatchResult};
pub use finding::{Finding, NaturalKey};
pub use oracle::{CommandOracle, OracleVerdict, ValidationOracle};
pub use patterns::compiler::{compile_patterns, get_or_compile_patterns, CompiledPatterns};
pub use reconcile::{reconcile, ReconcileMode, ReconcileOutcome, ReconcilePlan};
pub use remediation::{AutoFiller, FilePreview, RemediationReport, Remediator, TrailingNewlineFiller};
pub use rollback::{RollbackAdvisor, RollbackOutcome, RollbackStrategy};
pub use run::{AuditRun, RunReport};
pub use scanner::{ScanOutcome, Scanner};
pub use snapshot::Snapshotter;
pub use store::{AuditStore, CorrectionEntry, Outcome, Record, RecordStatus, RollbackEntry, Snapshot};
pub use tasks::{PlaceholderRewriter, Task, TaskGenerator, TemplateTokenRewriter};
