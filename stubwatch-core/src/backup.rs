// stubwatch-core/src/backup.rs
//! Pre-mutation backups and the scoped mutation guard.
//!
//! Every mutation attempt gets its own backup file. Names combine the
//! original file name, a short hash of the original path, a UTC timestamp
//! with nanoseconds and a per-manager sequence number, and files are created
//! with `create_new`, so a backup is never overwritten. Each backup carries
//! the SHA-256 of its bytes, checked again before restoring.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{StubwatchError, StubwatchResult};

/// Attempts at finding a free backup name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Handle on one backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRef {
    /// File the backup was taken from.
    pub original: PathBuf,
    /// Location of the backup copy.
    pub path: PathBuf,
    pub sha256: String,
}

impl BackupRef {
    pub fn new(original: impl Into<PathBuf>, path: impl Into<PathBuf>, sha256: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            path: path.into(),
            sha256: sha256.into(),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug)]
pub struct BackupManager {
    root: PathBuf,
    sequence: AtomicU64,
}

impl BackupManager {
    /// Creates the backup root if needed and checks it does not lie inside
    /// `scan_root`, where backups would be scanned and remediated themselves.
    pub fn new(backup_root: impl AsRef<Path>, scan_root: impl AsRef<Path>) -> StubwatchResult<Self> {
        let backup_root = backup_root.as_ref();
        let scan_root = scan_root.as_ref();
        std::fs::create_dir_all(backup_root).map_err(|e| StubwatchError::io(backup_root, e))?;

        let root = backup_root
            .canonicalize()
            .map_err(|e| StubwatchError::io(backup_root, e))?;
        let scan = scan_root
            .canonicalize()
            .map_err(|e| StubwatchError::io(scan_root, e))?;

        if root.starts_with(&scan) {
            return Err(StubwatchError::BackupRootInsideScanRoot {
                backup_root: root,
                scan_root: scan,
            });
        }

        debug!("Backup root: {}", root.display());
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    /// A manager for restores only. Nothing is scanned on this path, so
    /// there is no scan root to keep the backups out of, and the root need
    /// not exist: restores read the backup paths recorded on corrections.
    pub fn for_restore(backup_root: impl Into<PathBuf>) -> Self {
        let root = backup_root.into();
        debug!("Backup root (restore only): {}", root.display());
        Self {
            root,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies the current content of `path` into a fresh backup file.
    pub fn backup(&self, path: &Path) -> StubwatchResult<BackupRef> {
        let bytes = std::fs::read(path).map_err(|e| StubwatchError::io(path, e))?;
        self.backup_bytes(path, &bytes)
    }

    fn backup_bytes(&self, original: &Path, bytes: &[u8]) -> StubwatchResult<BackupRef> {
        let file_name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let path_hash = &sha256_hex(original.to_string_lossy().as_bytes())[..8];

        for _ in 0..MAX_NAME_ATTEMPTS {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.9fZ");
            let dest = self
                .root
                .join(format!("{}.{}.{}.{:04}.bak", file_name, path_hash, stamp, seq));

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&dest) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Backup name {} taken; retrying.", dest.display());
                    continue;
                }
                Err(e) => return Err(StubwatchError::io(&dest, e)),
            };
            file.write_all(bytes).map_err(|e| StubwatchError::io(&dest, e))?;
            file.sync_all().map_err(|e| StubwatchError::io(&dest, e))?;

            debug!("Backed up {} to {}", original.display(), dest.display());
            return Ok(BackupRef::new(original, dest, sha256_hex(bytes)));
        }

        Err(StubwatchError::Fatal(format!(
            "could not allocate a unique backup name for {}",
            original.display()
        )))
    }

    /// Writes the backup's bytes back over its original path, after checking
    /// the backup still exists and still hashes to the recorded digest.
    pub fn restore(&self, backup: &BackupRef) -> StubwatchResult<()> {
        let bytes = match std::fs::read(&backup.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StubwatchError::BackupMissing(backup.path.clone()))
            }
            Err(e) => return Err(StubwatchError::io(&backup.path, e)),
        };
        let actual = sha256_hex(&bytes);
        if actual != backup.sha256 {
            return Err(StubwatchError::BackupCorrupt {
                path: backup.path.clone(),
                expected: backup.sha256.clone(),
                actual,
            });
        }
        std::fs::write(&backup.original, &bytes).map_err(|e| StubwatchError::io(&backup.original, e))?;
        info!("Restored {} from {}", backup.original.display(), backup.path.display());
        Ok(())
    }

    /// Backs up `path` and returns a guard over its mutation.
    pub fn guard(&self, path: &Path) -> StubwatchResult<MutationGuard> {
        let original = std::fs::read(path).map_err(|e| StubwatchError::io(path, e))?;
        let backup = self.backup_bytes(path, &original)?;
        Ok(MutationGuard {
            path: path.to_path_buf(),
            original,
            backup,
            armed: true,
        })
    }
}

/// Scoped ownership of a file mutation.
///
/// While armed, dropping the guard writes the original bytes back, so an
/// early return or a panic between write and validation leaves the file as
/// it was. `commit` keeps the mutation; `hand_off` passes restore duty to
/// the rollback advisor.
#[derive(Debug)]
#[must_use = "an armed guard restores the original file when dropped"]
pub struct MutationGuard {
    path: PathBuf,
    original: Vec<u8>,
    backup: BackupRef,
    armed: bool,
}

impl MutationGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup(&self) -> &BackupRef {
        &self.backup
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn write(&self, content: &[u8]) -> StubwatchResult<()> {
        std::fs::write(&self.path, content).map_err(|e| StubwatchError::io(&self.path, e))
    }

    /// Keeps the mutation.
    pub fn commit(mut self) -> BackupRef {
        self.armed = false;
        self.backup.clone()
    }

    /// Disarms the guard; the caller restores through the backup.
    pub fn hand_off(mut self) -> BackupRef {
        self.armed = false;
        self.backup.clone()
    }

    /// Writes the in-memory original back now and disarms the guard. Used
    /// when the backup file itself could not be restored.
    pub fn revert(mut self) -> StubwatchResult<BackupRef> {
        self.armed = false;
        std::fs::write(&self.path, &self.original).map_err(|e| StubwatchError::io(&self.path, e))?;
        Ok(self.backup.clone())
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Mutation of {} was not committed; restoring original content.", self.path.display());
        if let Err(e) = std::fs::write(&self.path, &self.original) {
            error!("Could not restore {}: {}", self.path.display(), e);
        }
    }
}
