// stubwatch-core/src/scanner.rs
//! Walks a source tree and applies the compiled patterns line by line.
//!
//! Traversal is deterministic (directory entries sorted by file name), so two
//! scans of an unchanged tree produce the same `Finding` sequence. Reading is
//! best effort: unreadable and binary files are skipped and logged, invalid
//! UTF-8 is decoded lossily. The optional time budget is checked between
//! files and never interrupts a read in progress.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::{DirEntry, WalkDir};

use crate::errors::{StubwatchError, StubwatchResult};
use crate::finding::{capture_context, Finding};
use crate::patterns::compiler::CompiledPatterns;

/// Bytes inspected for NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8192;

/// Result of one scan, including the bookkeeping the run report needs.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Ordered by traversal order, then line, then pattern order.
    pub findings: Vec<Finding>,
    pub files_scanned: usize,
    pub files_skipped: usize,
    /// Total lines of every file that was read; feeds the density metric.
    pub lines_scanned: usize,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    patterns: Arc<CompiledPatterns>,
    exclude_names: Vec<String>,
    exclude_prefixes: Vec<PathBuf>,
    excluded_paths: Vec<PathBuf>,
    budget: Option<Duration>,
    context_max_len: usize,
}

impl Scanner {
    /// Creates a scanner over `root`. The root is canonicalised so stored
    /// file paths stay stable across runs started from different directories.
    pub fn new(root: impl AsRef<Path>, patterns: Arc<CompiledPatterns>) -> StubwatchResult<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| StubwatchError::io(root, e))?;
        Ok(Self {
            root,
            patterns,
            exclude_names: Vec::new(),
            exclude_prefixes: Vec::new(),
            excluded_paths: Vec::new(),
            budget: None,
            context_max_len: crate::config::DEFAULT_CONTEXT_MAX_LEN,
        })
    }

    /// Adds exclusions. Plain names (`target`) match any path component;
    /// entries containing a separator match root-relative prefixes.
    pub fn with_exclusions<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in exclusions {
            let raw = raw.as_ref().trim_end_matches(['/', '\\']);
            if raw.is_empty() {
                continue;
            }
            if raw.contains('/') || raw.contains('\\') {
                self.exclude_prefixes.push(PathBuf::from(raw));
            } else {
                self.exclude_names.push(raw.to_string());
            }
        }
        self
    }

    /// Excludes an absolute path (and everything below it) from the walk.
    pub fn exclude_path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.excluded_paths.push(resolved);
        self
    }

    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_context_max_len(mut self, max_len: usize) -> Self {
        self.context_max_len = max_len;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let path = entry.path();
        if self.excluded_paths.iter().any(|p| path.starts_with(p)) {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if self.exclude_names.iter().any(|n| *n == name) {
            return true;
        }
        match path.strip_prefix(&self.root) {
            Ok(rel) => self.exclude_prefixes.iter().any(|p| rel.starts_with(p)),
            Err(_) => false,
        }
    }

    /// Walks the tree and collects findings.
    pub fn scan(&self) -> ScanOutcome {
        let started = Instant::now();
        let mut outcome = ScanOutcome::default();
        info!("Scanning {} with {} patterns.", self.root.display(), self.patterns.patterns.len());

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e));

        for entry in walker {
            if let Some(budget) = self.budget {
                if started.elapsed() >= budget {
                    warn!(
                        "Scan budget of {:?} elapsed after {} files; returning partial results.",
                        budget, outcome.files_scanned
                    );
                    outcome.timed_out = true;
                    break;
                }
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    outcome.files_skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match self.scan_file(entry.path()) {
                Ok(Some((findings, lines))) => {
                    outcome.files_scanned += 1;
                    outcome.lines_scanned += lines;
                    outcome.findings.extend(findings);
                }
                Ok(None) => outcome.files_skipped += 1,
                Err(e) => {
                    warn!("Could not read {}: {}", entry.path().display(), e);
                    outcome.files_skipped += 1;
                }
            }
        }

        info!(
            "Scan finished in {:.2?}: {} files, {} skipped, {} findings.",
            started.elapsed(),
            outcome.files_scanned,
            outcome.files_skipped,
            outcome.findings.len()
        );
        outcome
    }

    /// Scans one file. `Ok(None)` means the file was skipped as binary.
    fn scan_file(&self, path: &Path) -> std::io::Result<Option<(Vec<Finding>, usize)>> {
        let bytes = std::fs::read(path)?;
        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if sniff.contains(&0) {
            debug!("Skipping binary file {}", path.display());
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&bytes);
        let file = path.to_string_lossy().into_owned();
        let mut findings = Vec::new();
        let mut lines = 0usize;

        for (idx, line) in text.lines().enumerate() {
            lines += 1;
            for pattern in &self.patterns.patterns {
                if pattern.regex.is_match(line) {
                    findings.push(Finding::new(
                        file.clone(),
                        idx + 1,
                        pattern.name.clone(),
                        capture_context(line, self.context_max_len),
                    ));
                }
            }
        }

        Ok(Some((findings, lines)))
    }
}
