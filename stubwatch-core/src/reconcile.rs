// stubwatch-core/src/reconcile.rs
//! Reconciliation of scan findings against stored records.
//!
//! Reconciling is split in two: a pure `ReconcilePlan` is computed from the
//! current findings and an index of stored keys, then the store applies the
//! plan in one transaction. Running the same findings twice yields an empty
//! second plan.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, error, info};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::errors::StubwatchResult;
use crate::finding::{Finding, NaturalKey};
use crate::store::{AuditStore, Record, RecordStatus};

/// What a reconciliation is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Insert new OPEN records and resolve vanished ones.
    Full,
    /// Only resolve vanished records. Used by auto-resolve and by the
    /// verification pass after remediation.
    ResolveOnly,
}

/// Stored state of a natural key. `Open` wins when both an OPEN and older
/// RESOLVED rows share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Open(i64),
    Resolved,
}

/// Transitions to apply, computed without touching the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Findings that need a new OPEN record, first occurrence of each key only.
    pub inserts: Vec<Finding>,
    /// OPEN record ids whose key is absent from the findings, ascending.
    pub resolutions: Vec<i64>,
    /// Keys that already had an OPEN record and are left alone.
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.resolutions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub resolved: usize,
    pub unchanged: usize,
    pub distinct_findings: usize,
    /// False when the store holds fewer records than there are distinct
    /// findings, which means a finding was lost on the way in.
    pub complete: bool,
}

/// Builds the key index from stored records.
pub fn build_index(records: &[Record]) -> HashMap<NaturalKey, KeyState> {
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        let state = match record.status {
            RecordStatus::Open => KeyState::Open(record.id),
            RecordStatus::Resolved => KeyState::Resolved,
        };
        index
            .entry(record.key.clone())
            .and_modify(|existing| {
                if matches!(state, KeyState::Open(_)) {
                    *existing = state;
                }
            })
            .or_insert(state);
    }
    index
}

/// Computes the transitions that bring the store in line with `findings`.
pub fn plan(
    findings: &[Finding],
    index: &HashMap<NaturalKey, KeyState>,
    mode: ReconcileMode,
) -> ReconcilePlan {
    let present: HashSet<NaturalKey> = findings.iter().map(Finding::key).collect();

    let mut resolutions: Vec<i64> = index
        .iter()
        .filter_map(|(key, state)| match state {
            KeyState::Open(id) if !present.contains(key) => Some(*id),
            _ => None,
        })
        .collect();
    resolutions.sort_unstable();

    let mut inserts = Vec::new();
    let mut unchanged = 0;
    let mut queued: HashSet<NaturalKey> = HashSet::new();
    for finding in findings {
        let key = finding.key();
        if queued.contains(&key) {
            continue;
        }
        match index.get(&key) {
            Some(KeyState::Open(_)) => unchanged += 1,
            // A key seen only on resolved records starts a fresh lifecycle.
            Some(KeyState::Resolved) | None => {
                if mode == ReconcileMode::Full {
                    inserts.push(finding.clone());
                }
            }
        }
        queued.insert(key);
    }

    ReconcilePlan {
        inserts,
        resolutions,
        unchanged,
    }
}

/// Reconciles `findings` against the store and applies the result.
///
/// With `partial_scan` set (the scan ran out of time) nothing is resolved:
/// an absent key may just sit in a file the scan never reached.
pub fn reconcile(
    store: &mut AuditStore,
    findings: &[Finding],
    mode: ReconcileMode,
    partial_scan: bool,
    actor: &str,
) -> StubwatchResult<ReconcileOutcome> {
    let index = build_index(&store.records(None)?);
    let mut plan = plan(findings, &index, mode);
    if partial_scan && !plan.resolutions.is_empty() {
        info!(
            "Scan was partial; holding back {} resolution(s) until a complete scan.",
            plan.resolutions.len()
        );
        plan.resolutions.clear();
    }
    debug!(
        "Reconcile plan ({:?}): {} insert(s), {} resolution(s), {} unchanged.",
        mode,
        plan.inserts.len(),
        plan.resolutions.len(),
        plan.unchanged
    );

    let now = chrono::Utc::now().to_rfc3339();
    let counts = if plan.is_empty() {
        Default::default()
    } else {
        store.apply_transitions(&plan.inserts, &plan.resolutions, actor, &now)?
    };

    let distinct_findings = findings.iter().map(Finding::key).collect::<HashSet<_>>().len();
    let total = store.total_records()? as usize;
    let complete = mode == ReconcileMode::ResolveOnly || total >= distinct_findings;
    if !complete {
        error!(
            "Audit incomplete: {} record(s) stored for {} distinct finding(s).",
            total, distinct_findings
        );
    }

    info!(
        "Reconciled {} finding(s): {} inserted, {} resolved.",
        findings.len(),
        counts.inserted,
        counts.resolved
    );
    Ok(ReconcileOutcome {
        inserted: counts.inserted,
        resolved: counts.resolved,
        unchanged: plan.unchanged,
        distinct_findings,
        complete,
    })
}
