//! compiler.rs - Manages the compilation and caching of scan patterns.
//!
//! This module provides a thread-safe, cached mechanism to convert a list of
//! `PatternRule`s into `CompiledPatterns`. Repeated runs in one process (the
//! scan and the verification re-scan of an `apply` run) share one compilation.
//!
//! License: MIT OR APACHE 2.0

use lazy_static::lazy_static;
use log::debug;
use regex::{Regex, RegexBuilder};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::config::{PatternKind, PatternRule, MAX_PATTERN_LENGTH};
use crate::errors::{StubwatchError, StubwatchResult};

/// A single compiled pattern, ready to be tested against a line.
#[derive(Debug)]
pub struct CompiledPattern {
    /// The pattern id stored on findings and records.
    pub name: String,
    pub regex: Regex,
    pub kind: PatternKind,
}

/// The ordered set of compiled patterns used by one scan.
#[derive(Debug, Default)]
pub struct CompiledPatterns {
    pub patterns: Vec<CompiledPattern>,
}

impl CompiledPatterns {
    /// Returns the compiled pattern with the given id.
    pub fn get(&self, name: &str) -> Option<&CompiledPattern> {
        self.patterns.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

lazy_static! {
    /// Process-wide cache keyed by a hash of the ordered pattern list.
    static ref COMPILED_PATTERNS_CACHE: RwLock<HashMap<u64, Arc<CompiledPatterns>>> =
        RwLock::new(HashMap::new());
}

/// Hashes the pattern list. Order is part of the key: two lists with the same
/// patterns in different order produce differently ordered findings.
fn hash_patterns(rules: &[PatternRule]) -> u64 {
    let mut hasher = DefaultHasher::new();
    rules.hash(&mut hasher);
    hasher.finish()
}

/// Compiles a list of `PatternRule`s. All failures are collected and reported together.
pub fn compile_patterns(rules: &[PatternRule]) -> StubwatchResult<CompiledPatterns> {
    debug!("Starting compilation of {} patterns.", rules.len());

    let mut compiled = Vec::with_capacity(rules.len());
    let mut errors = Vec::new();

    for rule in rules {
        if rule.pattern.len() > MAX_PATTERN_LENGTH {
            errors.push(StubwatchError::PatternLengthExceeded(
                rule.name.clone(),
                rule.pattern.len(),
                MAX_PATTERN_LENGTH,
            ));
            continue;
        }

        match RegexBuilder::new(&rule.pattern)
            .size_limit(10 * (1 << 20))
            .build()
        {
            Ok(regex) => {
                log::debug!(
                    target: "stubwatch_core::patterns",
                    "Pattern '{}' compiled successfully.",
                    rule.name
                );
                compiled.push(CompiledPattern {
                    name: rule.name.clone(),
                    regex,
                    kind: rule.kind,
                });
            }
            Err(e) => errors.push(StubwatchError::PatternCompilationError(rule.name.clone(), e)),
        }
    }

    if !errors.is_empty() {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("\n");
        return Err(StubwatchError::Fatal(format!(
            "Failed to compile {} pattern(s):\n{}",
            errors.len(),
            message
        )));
    }

    debug!("Finished compiling patterns. Total compiled: {}.", compiled.len());
    Ok(CompiledPatterns { patterns: compiled })
}

/// Gets `CompiledPatterns` from the cache or compiles them if not found.
pub fn get_or_compile_patterns(rules: &[PatternRule]) -> StubwatchResult<Arc<CompiledPatterns>> {
    let cache_key = hash_patterns(rules);

    {
        let cache = COMPILED_PATTERNS_CACHE
            .read()
            .map_err(|_| StubwatchError::Fatal("pattern cache lock poisoned".to_string()))?;
        if let Some(patterns) = cache.get(&cache_key) {
            debug!("Serving compiled patterns from cache for key: {}", cache_key);
            return Ok(Arc::clone(patterns));
        }
    }

    let compiled = Arc::new(compile_patterns(rules)?);
    COMPILED_PATTERNS_CACHE
        .write()
        .map_err(|_| StubwatchError::Fatal("pattern cache lock poisoned".to_string()))?
        .insert(cache_key, Arc::clone(&compiled));

    debug!("Compiled and cached patterns for key: {}", cache_key);
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, pattern: &str) -> PatternRule {
        PatternRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn compiles_in_order() {
        let compiled = compile_patterns(&[rule("b", "B"), rule("a", "A")]).unwrap();
        let names: Vec<&str> = compiled.patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(compiled.get("a").is_some());
    }

    #[test]
    fn reports_all_bad_patterns() {
        let long = "a".repeat(MAX_PATTERN_LENGTH + 1);
        let err = compile_patterns(&[rule("open", "("), rule("long", &long)]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Failed to compile 2 pattern(s)"));
        assert!(msg.contains("'open'"));
        assert!(msg.contains("'long'"));
    }

    #[test]
    fn cache_returns_shared_instance() {
        let rules = vec![rule("cache_probe", "PROBE")];
        let a = get_or_compile_patterns(&rules).unwrap();
        let b = get_or_compile_patterns(&rules).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
