// stubwatch-core/tests/config_integration_tests.rs
use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;

use stubwatch_core::config::{self, AuditConfig, PatternKind, PatternRule, UserConfig};

#[test]
fn test_load_default_config() {
    let config = AuditConfig::load_default().unwrap();
    assert!(!config.patterns.is_empty());
    let pass = config.patterns.iter().find(|p| p.name == "bare_pass").unwrap();
    assert_eq!(pass.kind, PatternKind::Stub);
    // `placeholder` is too noisy to be on by default.
    assert!(!config.active_patterns().iter().any(|p| p.name == "placeholder"));
}

#[test]
fn test_load_from_file() -> Result<()> {
    let yaml_content = r#"
author: "ci-bot"
patterns:
  - name: wip
    pattern: '\bWIP\b'
    description: "Work in progress"
scan:
  exclude: ["build"]
  timeout_secs: 60
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(yaml_content.as_bytes())?;
    let defaults = AuditConfig::load_default()?;
    let config = AuditConfig::load_from_file(file.path())?;
    assert_eq!(config.author, "ci-bot");
    assert_eq!(config.patterns.len(), defaults.patterns.len() + 1);
    let wip = config.pattern("wip")?;
    assert_eq!(wip.kind, PatternKind::Marker); // Omitted kind defaults to marker
    assert_eq!(config.scan.timeout_secs, Some(60));
    assert_eq!(config.scan.context_max_len, config::DEFAULT_CONTEXT_MAX_LEN);
    // Default excludes survive a user exclude list.
    assert!(config.scan.exclude.iter().any(|e| e == ".git"));
    assert!(config.scan.exclude.iter().any(|e| e == "build"));
    assert_eq!(config.rollback, defaults.rollback);
    Ok(())
}

#[test]
fn test_user_file_without_scan_section_keeps_default_scan_settings() -> Result<()> {
    let yaml_content = r#"
author: "ci-bot"
patterns:
  - name: wip
    pattern: '\bWIP\b'
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(yaml_content.as_bytes())?;
    let config = AuditConfig::load_from_file(file.path())?;
    let defaults = AuditConfig::load_default()?;
    assert_eq!(config.scan, defaults.scan);
    assert_eq!(config.scan.timeout_secs, Some(1800));
    for dir in [".git", "target", "node_modules", "__pycache__"] {
        assert!(config.scan.exclude.iter().any(|e| e == dir), "missing default exclude {dir}");
    }
    Ok(())
}

#[test]
fn test_load_from_file_rejects_invalid_patterns() -> Result<()> {
    let yaml_content = r#"
patterns:
  - name: broken
    pattern: "(unclosed"
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(yaml_content.as_bytes())?;
    let err = AuditConfig::load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Pattern validation failed"));
    Ok(())
}

#[test]
fn test_merge_user_config_over_defaults() -> Result<()> {
    let defaults = AuditConfig::load_default()?;
    let default_len = defaults.patterns.len();
    let user = UserConfig {
        patterns: vec![
            PatternRule {
                name: "todo".to_string(),
                pattern: r"(?i)\btodo\b".to_string(),
                ..Default::default()
            },
            PatternRule {
                name: "wip".to_string(),
                pattern: r"\bWIP\b".to_string(),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let merged = config::merge_config(defaults, Some(user));
    assert_eq!(merged.patterns.len(), default_len + 1);
    assert_eq!(merged.patterns[0].pattern, r"(?i)\btodo\b");
    assert_eq!(merged.patterns.last().unwrap().name, "wip");
    Ok(())
}

#[test]
fn test_unknown_pattern_lookup() {
    let config = AuditConfig::load_default().unwrap();
    let err = config.pattern("does_not_exist").unwrap_err();
    assert_eq!(err.to_string(), "Pattern 'does_not_exist' not found.");
}
