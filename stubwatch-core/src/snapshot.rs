// stubwatch-core/src/snapshot.rs
//! Run-scoped snapshotting of aggregate record counts.
//!
//! A `Snapshotter` belongs to exactly one run. The first `snapshot()` call
//! appends a row; later calls in the same run hand back that row without
//! writing. The same holds for the density metric.

use log::{debug, info};

use crate::errors::StubwatchResult;
use crate::store::{AuditStore, DensitySnapshot, Snapshot};

#[derive(Debug)]
pub struct Snapshotter {
    run_id: String,
    taken: Option<Snapshot>,
    density: Option<DensitySnapshot>,
}

impl Snapshotter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            taken: None,
            density: None,
        }
    }

    /// Appends the current OPEN/RESOLVED totals, once per run.
    pub fn snapshot(&mut self, store: &AuditStore) -> StubwatchResult<Snapshot> {
        if let Some(existing) = &self.taken {
            debug!("Snapshot already taken for run {}; reusing it.", self.run_id);
            return Ok(existing.clone());
        }
        let (open, resolved) = store.status_counts()?;
        let now = chrono::Utc::now().to_rfc3339();
        let snapshot = store.append_snapshot(&self.run_id, &now, open, resolved)?;
        info!("Snapshot: {} open, {} resolved.", open, resolved);
        self.taken = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Appends open records per 1000 tracked lines, once per run.
    pub fn density(&mut self, store: &AuditStore, tracked_lines: u64) -> StubwatchResult<DensitySnapshot> {
        if let Some(existing) = &self.density {
            return Ok(existing.clone());
        }
        let (open, _) = store.status_counts()?;
        let per_kloc = open_per_kloc(open, tracked_lines);
        let now = chrono::Utc::now().to_rfc3339();
        let density = store.append_density_snapshot(&self.run_id, &now, open, tracked_lines, per_kloc)?;
        debug!("Density: {:.3} open per 1000 lines.", per_kloc);
        self.density = Some(density.clone());
        Ok(density)
    }

    pub fn taken(&self) -> Option<&Snapshot> {
        self.taken.as_ref()
    }
}

pub fn open_per_kloc(open: u64, tracked_lines: u64) -> f64 {
    if tracked_lines == 0 {
        0.0
    } else {
        open as f64 * 1000.0 / tracked_lines as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_fires_once_per_run() {
        let store = AuditStore::open_in_memory().unwrap();
        let mut snapshotter = Snapshotter::new("run-1");
        let first = snapshotter.snapshot(&store).unwrap();
        let second = snapshotter.snapshot(&store).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.snapshots(None).unwrap().len(), 1);

        Snapshotter::new("run-2").snapshot(&store).unwrap();
        assert_eq!(store.snapshots(None).unwrap().len(), 2);
    }

    #[test]
    fn density_handles_empty_trees() {
        assert_eq!(open_per_kloc(3, 0), 0.0);
        assert_eq!(open_per_kloc(3, 1500), 2.0);

        let store = AuditStore::open_in_memory().unwrap();
        let mut snapshotter = Snapshotter::new("run");
        snapshotter.density(&store, 10).unwrap();
        snapshotter.density(&store, 20).unwrap();
        let series = store.density_snapshots(None).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].tracked_lines, 10);
    }
}
