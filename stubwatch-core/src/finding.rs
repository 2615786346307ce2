// stubwatch-core/src/finding.rs
//! Core data structures for scan results.
//!
//! A `Finding` is one pattern match on one line, produced by the scanner and
//! never persisted directly. Its `NaturalKey` is the identity the reconciler
//! uses to line findings up with stored records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a placeholder occurrence: (file, line, pattern id, context).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub file: String,
    pub line: usize,
    pub pattern: String,
    pub context: String,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} [{}] {}", self.file, self.line, self.pattern, self.context)
    }
}

/// A single match discovered during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    pub pattern: String,
    /// The matched source line, trimmed and length-capped.
    pub context: String,
}

impl Finding {
    pub fn new(file: impl Into<String>, line: usize, pattern: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            pattern: pattern.into(),
            context: context.into(),
        }
    }

    pub fn key(&self) -> NaturalKey {
        NaturalKey {
            file: self.file.clone(),
            line: self.line,
            pattern: self.pattern.clone(),
            context: self.context.clone(),
        }
    }
}

/// Builds the stored context for a source line: surrounding whitespace is
/// dropped and the result is capped at `max_len` characters.
pub fn capture_context(line: &str, max_len: usize) -> String {
    line.trim().chars().take(max_len).collect()
}
