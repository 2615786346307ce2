//! Row types of the record store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StubwatchError;
use crate::finding::NaturalKey;

/// Lifecycle status of a record. RESOLVED records are immutable history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Open,
    Resolved,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Open => "open",
            RecordStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = StubwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RecordStatus::Open),
            "resolved" => Ok(RecordStatus::Resolved),
            other => Err(StubwatchError::InvalidStatus(other.to_string())),
        }
    }
}

/// The persisted lifecycle of one placeholder occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(flatten)]
    pub key: NaturalKey,
    pub suggestion: Option<String>,
    pub created_at: String,
    pub author: String,
    pub status: RecordStatus,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
}

impl Record {
    pub fn is_open(&self) -> bool {
        self.status == RecordStatus::Open
    }
}

/// Aggregate OPEN/RESOLVED totals, appended once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub run_id: String,
    pub taken_at: String,
    pub open_count: u64,
    pub resolved_count: u64,
}

/// Open records per 1000 tracked lines, appended at most once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensitySnapshot {
    pub id: i64,
    pub run_id: String,
    pub taken_at: String,
    pub open_count: u64,
    pub tracked_lines: u64,
    pub open_per_kloc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = StubwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(StubwatchError::InvalidStatus(other.to_string())),
        }
    }
}

/// Which remediation step produced a correction entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Suggestions applied to a file.
    Remediation,
    /// Generated content appended after a successful remediation.
    Autofill,
}

impl CorrectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionKind::Remediation => "remediation",
            CorrectionKind::Autofill => "autofill",
        }
    }
}

impl FromStr for CorrectionKind {
    type Err = StubwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remediation" => Ok(CorrectionKind::Remediation),
            "autofill" => Ok(CorrectionKind::Autofill),
            other => Err(StubwatchError::InvalidStatus(other.to_string())),
        }
    }
}

/// Audit row for one remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub id: i64,
    pub run_id: String,
    pub file: String,
    pub backup_path: Option<String>,
    pub backup_sha256: Option<String>,
    pub rationale: String,
    pub kind: CorrectionKind,
    pub outcome: Outcome,
    pub created_at: String,
}

/// Fields of a correction entry before it is stored.
#[derive(Debug, Clone)]
pub struct NewCorrection<'a> {
    pub run_id: &'a str,
    pub file: &'a str,
    pub backup_path: Option<&'a str>,
    pub backup_sha256: Option<&'a str>,
    pub rationale: &'a str,
    pub kind: CorrectionKind,
    pub outcome: Outcome,
}

/// Audit row for one restore attempt. A failed entry is a rollback failure:
/// the safety net itself did not work, as opposed to a failed correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub id: i64,
    pub run_id: String,
    pub file: String,
    pub backup_path: Option<String>,
    pub correction_id: Option<i64>,
    pub outcome: Outcome,
    pub detail: String,
    pub created_at: String,
}

/// Restore history of one file, derived from rollback entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackCounts {
    pub successes: u32,
    pub failures: u32,
}

impl RollbackCounts {
    pub fn total(&self) -> u32 {
        self.successes + self.failures
    }
}
