//! Configuration management for `stubwatch-core`.
//!
//! This module defines the pattern rules the scanner matches against and the
//! settings of every engine stage (scan, task generation, rollback advice).
//! It handles YAML deserialisation, loading the embedded defaults, merging a
//! user file over them and validating the result.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Maximum allowed length for a pattern's regex source.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Default cap on the stored context of a finding, in characters.
pub const DEFAULT_CONTEXT_MAX_LEN: usize = 200;

/// Successful rollbacks on one file before regression tests are recommended.
pub const DEFAULT_REGRESSION_TESTS_AFTER_SUCCESSES: u32 = 2;

/// Failed restores on one file before a manual audit is recommended.
pub const DEFAULT_MANUAL_AUDIT_AFTER_FAILURES: u32 = 2;

/// How a pattern's matches are turned into suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Inline marker comment (TODO, FIXME, ...). Suggestions strip the marker.
    #[default]
    Marker,
    /// Structural stub token (`pass`, template tokens, ...). Suggestions are
    /// delegated to a placeholder rewriter.
    Stub,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PatternKind::Marker => write!(f, "marker"),
            PatternKind::Stub => write!(f, "stub"),
        }
    }
}

/// A single match pattern. `name` is the pattern id persisted on records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PatternRule {
    pub name: String,
    pub pattern: String,
    pub kind: PatternKind,
    pub description: Option<String>,
    /// `Some(false)` disables the rule unless it is explicitly enabled.
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Directory/file names, or root-relative path prefixes, to skip.
    pub exclude: Vec<String>,
    /// Soft time budget for a scan; `None` means unbounded.
    pub timeout_secs: Option<u64>,
    pub context_max_len: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            timeout_secs: None,
            context_max_len: DEFAULT_CONTEXT_MAX_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskSettings {
    /// TinyTemplate source used for task descriptions. Available fields:
    /// `pattern`, `file`, `line`, `context`.
    pub description_template: String,
    /// Lines of surrounding content handed to a placeholder rewriter, on each side.
    pub rewrite_window: usize,
    /// Template placeholders that are legitimate and must not be stripped.
    pub known_placeholders: Vec<String>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            description_template: "Remove {pattern} placeholder in {file} at line {line}".to_string(),
            rewrite_window: 3,
            known_placeholders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RollbackThresholds {
    pub regression_tests_after_successes: u32,
    pub manual_audit_after_failures: u32,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        Self {
            regression_tests_after_successes: DEFAULT_REGRESSION_TESTS_AFTER_SUCCESSES,
            manual_audit_after_failures: DEFAULT_MANUAL_AUDIT_AFTER_FAILURES,
        }
    }
}

/// Top-level configuration for a stubwatch run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Stamped as `author` on new records and as `resolved_by` on resolutions.
    pub author: String,
    pub patterns: Vec<PatternRule>,
    pub scan: ScanSettings,
    pub tasks: TaskSettings,
    pub rollback: RollbackThresholds,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            author: "stubwatch".to_string(),
            patterns: Vec::new(),
            scan: ScanSettings::default(),
            tasks: TaskSettings::default(),
            rollback: RollbackThresholds::default(),
        }
    }
}

/// A user configuration file, merged over the defaults. Sections and scan
/// fields the file leaves out keep their default values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub author: Option<String>,
    pub patterns: Vec<PatternRule>,
    pub scan: Option<ScanOverlay>,
    pub tasks: Option<TaskSettings>,
    pub rollback: Option<RollbackThresholds>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanOverlay {
    /// Appended to the default excludes.
    pub exclude: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub context_max_len: Option<usize>,
}

impl UserConfig {
    /// Reads and validates a user configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: UserConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_patterns(&config.patterns)?;
        info!("Loaded {} patterns from file {}.", config.patterns.len(), path.display());

        Ok(config)
    }
}

/// Error type for a pattern name that the active configuration does not know.
#[derive(Debug)]
pub struct PatternNotFoundError {
    pub pattern_name: String,
}

impl fmt::Display for PatternNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pattern '{}' not found.", self.pattern_name)
    }
}

impl std::error::Error for PatternNotFoundError {}

impl AuditConfig {
    /// Loads a YAML user file merged over the built-in defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let user = UserConfig::load_from_file(path)?;
        Ok(merge_config(Self::load_default()?, Some(user)))
    }

    /// Loads the built-in configuration embedded in the crate.
    pub fn load_default() -> Result<Self> {
        debug!("Loading default configuration from embedded string...");
        let default_yaml = include_str!("../config/default_config.yaml");
        let config: AuditConfig =
            serde_yml::from_str(default_yaml).context("Failed to parse default configuration")?;

        debug!("Loaded {} default patterns.", config.patterns.len());
        Ok(config)
    }

    /// Filters active patterns based on enable/disable lists provided via CLI.
    pub fn set_active_patterns(&mut self, enable: &[String], disable: &[String]) {
        let enable_set: HashSet<&str> = enable.iter().map(String::as_str).collect();
        let disable_set: HashSet<&str> = disable.iter().map(String::as_str).collect();

        let known: HashSet<&str> = self.patterns.iter().map(|p| p.name.as_str()).collect();
        for name in enable_set.difference(&known) {
            warn!("Pattern '{}' in `enable` list does not exist.", name);
        }
        for name in disable_set.difference(&known) {
            warn!("Pattern '{}' in `disable` list does not exist.", name);
        }

        self.patterns.retain(|p| {
            let name = p.name.as_str();
            !disable_set.contains(name) && (p.enabled != Some(false) || enable_set.contains(name))
        });
        // An explicitly enabled rule is active from here on.
        for p in self.patterns.iter_mut() {
            if enable_set.contains(p.name.as_str()) {
                p.enabled = Some(true);
            }
        }

        debug!("Active patterns after filtering: {}", self.patterns.len());
    }

    /// Patterns that take part in a scan, in configured order.
    pub fn active_patterns(&self) -> Vec<PatternRule> {
        self.patterns
            .iter()
            .filter(|p| p.enabled != Some(false))
            .cloned()
            .collect()
    }

    /// Looks up a pattern by its id.
    pub fn pattern(&self, name: &str) -> Result<&PatternRule, PatternNotFoundError> {
        self.patterns
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PatternNotFoundError { pattern_name: name.to_string() })
    }
}

/// Merges a user configuration over the defaults.
///
/// Patterns are merged by name: a user pattern replaces the default of the
/// same name in place, new user patterns are appended in file order. User
/// excludes are added to the default ones. Any other section or scan field
/// the user gives replaces the default; the rest are kept.
pub fn merge_config(default_config: AuditConfig, user_config: Option<UserConfig>) -> AuditConfig {
    let Some(user) = user_config else {
        debug!("No user config provided; using {} default patterns.", default_config.patterns.len());
        return default_config;
    };

    debug!(
        "Merging {} user patterns over {} defaults.",
        user.patterns.len(),
        default_config.patterns.len()
    );

    let mut patterns = default_config.patterns;
    let positions: HashMap<String, usize> = patterns
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    for user_pattern in user.patterns {
        match positions.get(&user_pattern.name) {
            Some(&idx) => patterns[idx] = user_pattern,
            None => patterns.push(user_pattern),
        }
    }

    debug!("Final total patterns after merge: {}", patterns.len());

    let mut scan = default_config.scan;
    if let Some(overlay) = user.scan {
        for name in overlay.exclude {
            if !scan.exclude.contains(&name) {
                scan.exclude.push(name);
            }
        }
        if overlay.timeout_secs.is_some() {
            scan.timeout_secs = overlay.timeout_secs;
        }
        if let Some(len) = overlay.context_max_len {
            scan.context_max_len = len;
        }
    }

    AuditConfig {
        author: user.author.unwrap_or(default_config.author),
        patterns,
        scan,
        tasks: user.tasks.unwrap_or(default_config.tasks),
        rollback: user.rollback.unwrap_or(default_config.rollback),
    }
}

/// Validates pattern integrity (names, regex compilation, length).
pub fn validate_patterns(patterns: &[PatternRule]) -> Result<()> {
    let mut names = HashSet::new();
    let mut errors = Vec::new();

    for rule in patterns {
        if rule.name.is_empty() {
            errors.push("A pattern has an empty `name` field.".to_string());
        } else if !names.insert(rule.name.clone()) {
            errors.push(format!("Duplicate pattern name found: '{}'.", rule.name));
        }

        if rule.pattern.is_empty() {
            errors.push(format!("Pattern '{}' has an empty `pattern` field.", rule.name));
            continue;
        }

        if rule.pattern.len() > MAX_PATTERN_LENGTH {
            errors.push(format!(
                "Pattern '{}' is {} characters long; the maximum is {}.",
                rule.name,
                rule.pattern.len(),
                MAX_PATTERN_LENGTH
            ));
            continue;
        }

        if let Err(e) = Regex::new(&rule.pattern) {
            errors.push(format!("Pattern '{}' has an invalid regex: {}", rule.name, e));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Pattern validation failed:\n{}", errors.join("\n")))
    }
}
