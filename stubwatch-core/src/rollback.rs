// stubwatch-core/src/rollback.rs
//! Restores and the strategy advice derived from restore history.
//!
//! Counts come from the rollback entries in the store, so advice survives
//! across runs. Failed restores are checked first: once the safety net
//! itself has failed often enough, nothing short of a manual audit helps.
//!
//! License: MIT OR APACHE 2.0

use log::{error, info, warn};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::backup::{BackupManager, BackupRef};
use crate::config::RollbackThresholds;
use crate::errors::{StubwatchError, StubwatchResult};
use crate::store::{AuditStore, CorrectionEntry, Outcome, RollbackCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
    /// Restore from backup and carry on.
    Standard,
    /// The file keeps needing rollbacks; cover it with regression tests.
    RegressionTests,
    /// Restores of the file keep failing; inspect it by hand.
    ManualAudit,
}

impl RollbackStrategy {
    pub fn advice(&self) -> &'static str {
        match self {
            RollbackStrategy::Standard => "restore from backup and retry",
            RollbackStrategy::RegressionTests => "add regression tests before remediating again",
            RollbackStrategy::ManualAudit => "audit the file manually; automatic restores are unreliable",
        }
    }
}

impl fmt::Display for RollbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RollbackStrategy::Standard => "standard",
            RollbackStrategy::RegressionTests => "regression_tests",
            RollbackStrategy::ManualAudit => "manual_audit",
        };
        f.write_str(s)
    }
}

pub fn suggest_strategy(counts: RollbackCounts, thresholds: RollbackThresholds) -> RollbackStrategy {
    if counts.failures >= thresholds.manual_audit_after_failures {
        RollbackStrategy::ManualAudit
    } else if counts.successes >= thresholds.regression_tests_after_successes {
        RollbackStrategy::RegressionTests
    } else {
        RollbackStrategy::Standard
    }
}

/// Result of one restore attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub rollback_id: i64,
    pub file: PathBuf,
    pub restored: bool,
    pub detail: String,
    /// Advice for the file, counting this attempt.
    pub strategy: RollbackStrategy,
}

pub struct RollbackAdvisor<'a> {
    store: &'a AuditStore,
    backups: &'a BackupManager,
    thresholds: RollbackThresholds,
    run_id: &'a str,
}

impl<'a> RollbackAdvisor<'a> {
    pub fn new(
        store: &'a AuditStore,
        backups: &'a BackupManager,
        thresholds: RollbackThresholds,
        run_id: &'a str,
    ) -> Self {
        Self {
            store,
            backups,
            thresholds,
            run_id,
        }
    }

    pub fn counts(&self, file: &str) -> StubwatchResult<RollbackCounts> {
        self.store.rollback_counts(file)
    }

    pub fn suggest(&self, file: &str) -> StubwatchResult<RollbackStrategy> {
        Ok(suggest_strategy(self.counts(file)?, self.thresholds))
    }

    /// Restores `backup` over its original file and records the attempt.
    ///
    /// A failed restore is not an error of this call: it is recorded as a
    /// failed rollback entry and reported in the outcome. Only store errors
    /// propagate.
    pub fn restore(&self, backup: &BackupRef, correction_id: Option<i64>) -> StubwatchResult<RollbackOutcome> {
        let file = backup.original.to_string_lossy().into_owned();
        let backup_path = backup.path.to_string_lossy().into_owned();

        let (outcome, detail) = match self.backups.restore(backup) {
            Ok(()) => (Outcome::Success, format!("restored from {}", backup_path)),
            Err(e) => {
                error!("Rollback of {} failed: {}", file, e);
                (Outcome::Failure, e.to_string())
            }
        };

        let rollback_id = self.store.append_rollback(
            self.run_id,
            &file,
            Some(backup_path.as_str()),
            correction_id,
            outcome,
            &detail,
        )?;

        let strategy = self.suggest(&file)?;
        match strategy {
            RollbackStrategy::Standard => info!("Rollback strategy for {}: {}.", file, strategy.advice()),
            _ => warn!("Rollback strategy for {}: {}.", file, strategy.advice()),
        }

        Ok(RollbackOutcome {
            rollback_id,
            file: backup.original.clone(),
            restored: outcome == Outcome::Success,
            detail,
            strategy,
        })
    }

    /// Restores the backup a correction entry refers to.
    pub fn restore_correction(&self, correction: &CorrectionEntry) -> StubwatchResult<RollbackOutcome> {
        let (Some(path), Some(sha)) = (&correction.backup_path, &correction.backup_sha256) else {
            return Err(StubwatchError::NotFound(format!("Backup for correction {}", correction.id)));
        };
        let backup = BackupRef::new(&correction.file, path, sha);
        self.restore(&backup, Some(correction.id))
    }

    /// Undoes the most recent successful correction.
    pub fn rollback_last(&self) -> StubwatchResult<RollbackOutcome> {
        let correction = self
            .store
            .last_restorable_correction()?
            .ok_or_else(|| StubwatchError::NotFound("A restorable correction".to_string()))?;
        self.restore_correction(&correction)
    }

    pub fn rollback_by_id(&self, correction_id: i64) -> StubwatchResult<RollbackOutcome> {
        let correction = self
            .store
            .correction(correction_id)?
            .ok_or_else(|| StubwatchError::NotFound(format!("Correction {}", correction_id)))?;
        self.restore_correction(&correction)
    }
}
