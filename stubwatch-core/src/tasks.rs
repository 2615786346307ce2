// stubwatch-core/src/tasks.rs
//! Projection of OPEN records into removal tasks.
//!
//! Every task carries a suggested replacement for the record's line. Marker
//! patterns (TODO, FIXME, ...) get a mechanical suggestion that strips the
//! marker; stub patterns are handed to a `PlaceholderRewriter`. Whenever no
//! better suggestion can be made the suggestion is the unchanged context,
//! which the remediator treats as a no-op.
//!
//! Generating tasks never writes to the store.
//!
//! License: MIT OR APACHE 2.0

use anyhow::Result;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tinytemplate::TinyTemplate;

use crate::config::{PatternKind, TaskSettings};
use crate::errors::{StubwatchError, StubwatchResult};
use crate::patterns::compiler::CompiledPatterns;
use crate::store::Record;

/// Comment leaders recognised when stripping markers.
const COMMENT_LEADERS: [&str; 5] = ["<!--", "//", "/*", "--", "#"];

/// Block comment terminators that carry no content of their own.
const COMMENT_CLOSERS: [&str; 2] = ["*/", "-->"];

static TEMPLATE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("template token regex is valid")
});

/// How a task's suggestion was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStrategy {
    MarkerStrip,
    Rewriter,
    /// No suggestion could be made; the context is returned unchanged.
    Unchanged,
}

/// One removal task, derived from an OPEN record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub record_id: i64,
    pub description: String,
    pub file: String,
    pub line: usize,
    pub pattern: String,
    pub context: String,
    pub suggestion: String,
    pub strategy: SuggestionStrategy,
}

impl Task {
    /// True when applying the suggestion would change the line.
    pub fn is_actionable(&self) -> bool {
        self.suggestion != self.context
    }
}

/// The slice of a file a rewriter gets to look at.
#[derive(Debug)]
pub struct RewriteRequest<'a> {
    pub file: &'a str,
    /// 1-based line of the stub.
    pub line: usize,
    pub pattern: &'a str,
    /// The full, untrimmed source line.
    pub target: &'a str,
    /// Lines around the target, target included.
    pub window: &'a [String],
    /// 1-based line number of `window[0]`.
    pub window_start: usize,
}

/// Rewrites a line holding a structural stub.
pub trait PlaceholderRewriter {
    fn rewrite(&self, request: &RewriteRequest<'_>) -> Result<String>;
}

/// Removes `{{TOKEN}}` template placeholders that are not known to be
/// legitimate. Lines without such tokens come back unchanged.
#[derive(Debug, Clone, Default)]
pub struct TemplateTokenRewriter {
    known: HashSet<String>,
}

impl TemplateTokenRewriter {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
        }
    }
}

impl PlaceholderRewriter for TemplateTokenRewriter {
    fn rewrite(&self, request: &RewriteRequest<'_>) -> Result<String> {
        let rewritten = TEMPLATE_TOKEN_RE.replace_all(request.target, |caps: &regex::Captures| {
            if self.known.contains(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        Ok(rewritten.trim_end().to_string())
    }
}

#[derive(Serialize)]
struct DescriptionContext<'a> {
    pattern: &'a str,
    file: &'a str,
    line: usize,
    context: &'a str,
}

/// Turns OPEN records into tasks.
pub struct TaskGenerator<'a> {
    patterns: &'a CompiledPatterns,
    settings: &'a TaskSettings,
    rewriter: Option<&'a dyn PlaceholderRewriter>,
}

impl<'a> TaskGenerator<'a> {
    pub fn new(patterns: &'a CompiledPatterns, settings: &'a TaskSettings) -> Self {
        Self {
            patterns,
            settings,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: &'a dyn PlaceholderRewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Generates one task per OPEN record, in record order. RESOLVED records
    /// are ignored.
    pub fn generate(&self, records: &[Record]) -> StubwatchResult<Vec<Task>> {
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template("description", &self.settings.description_template)
            .map_err(|e| StubwatchError::Template(e.to_string()))?;

        let mut files: HashMap<String, Option<Vec<String>>> = HashMap::new();
        let mut tasks = Vec::new();

        for record in records.iter().filter(|r| r.is_open()) {
            let key = &record.key;
            let description = tt
                .render(
                    "description",
                    &DescriptionContext {
                        pattern: &key.pattern,
                        file: &key.file,
                        line: key.line,
                        context: &key.context,
                    },
                )
                .map_err(|e| StubwatchError::Template(e.to_string()))?;

            let (suggestion, strategy) = self.suggest(record, &mut files);
            tasks.push(Task {
                record_id: record.id,
                description,
                file: key.file.clone(),
                line: key.line,
                pattern: key.pattern.clone(),
                context: key.context.clone(),
                suggestion,
                strategy,
            });
        }

        debug!("Generated {} task(s).", tasks.len());
        Ok(tasks)
    }

    fn suggest(
        &self,
        record: &Record,
        files: &mut HashMap<String, Option<Vec<String>>>,
    ) -> (String, SuggestionStrategy) {
        let key = &record.key;
        let unchanged = (key.context.clone(), SuggestionStrategy::Unchanged);

        let Some(pattern) = self.patterns.get(&key.pattern) else {
            debug!("Pattern '{}' is no longer configured; leaving {} unchanged.", key.pattern, key);
            return unchanged;
        };

        match pattern.kind {
            PatternKind::Marker => match strip_marker(&key.context, &pattern.regex) {
                Some(s) => (s, SuggestionStrategy::MarkerStrip),
                None => unchanged,
            },
            PatternKind::Stub => {
                let Some(rewriter) = self.rewriter else {
                    return unchanged;
                };
                let lines = files
                    .entry(key.file.clone())
                    .or_insert_with(|| read_lines(&key.file));
                let Some(lines) = lines.as_deref() else {
                    return unchanged;
                };
                if key.line == 0 || key.line > lines.len() {
                    return unchanged;
                }

                let idx = key.line - 1;
                let start = idx.saturating_sub(self.settings.rewrite_window);
                let end = (idx + self.settings.rewrite_window + 1).min(lines.len());
                let request = RewriteRequest {
                    file: &key.file,
                    line: key.line,
                    pattern: &key.pattern,
                    target: &lines[idx],
                    window: &lines[start..end],
                    window_start: start + 1,
                };
                match rewriter.rewrite(&request) {
                    Ok(line) => (line.trim().to_string(), SuggestionStrategy::Rewriter),
                    Err(e) => {
                        warn!("Rewriter failed for {}:{} [{}]: {}", key.file, key.line, key.pattern, e);
                        unchanged
                    }
                }
            }
        }
    }
}

fn read_lines(path: &str) -> Option<Vec<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect()),
        Err(e) => {
            warn!("Could not read {} for rewriting: {}", path, e);
            None
        }
    }
}

/// Finds the comment leader that owns the text before `end`: the one ending
/// last, the longer one on ties (`<!--` over `--`).
fn find_comment_leader(text: &str) -> Option<(usize, &'static str)> {
    COMMENT_LEADERS
        .iter()
        .filter_map(|leader| text.rfind(leader).map(|pos| (pos, *leader)))
        .max_by_key(|(pos, leader)| (pos + leader.len(), leader.len()))
}

/// Drops an `(owner)` tag and the punctuation following a marker.
fn strip_marker_tail(rest: &str) -> &str {
    let mut rest = rest;
    if rest.starts_with('(') {
        if let Some(close) = rest.find(')') {
            rest = &rest[close + 1..];
        }
    }
    rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | ',' | '.' | '!' | ';'))
}

/// Suggestion for a marker comment. `None` when the marker is not found in
/// the context.
///
/// * `x = 1  # TODO remove` becomes `x = 1`
/// * `# TODO: wire retries` becomes `# wire retries`
/// * `# TODO` becomes an empty line
/// * `TODO: remove this` becomes `remove this`
pub fn strip_marker(context: &str, marker: &Regex) -> Option<String> {
    let m = marker.find(context)?;
    let before = &context[..m.start()];
    let after = strip_marker_tail(&context[m.end()..]).trim_end();

    match find_comment_leader(before) {
        Some((pos, leader)) => {
            let code = context[..pos].trim_end();
            if !code.is_empty() {
                return Some(code.to_string());
            }
            let between = before[pos + leader.len()..].trim();
            let tail = if COMMENT_CLOSERS.contains(&after) { "" } else { after };
            let body: Vec<&str> = [between, tail].into_iter().filter(|s| !s.is_empty()).collect();
            if body.is_empty() {
                Some(String::new())
            } else {
                Some(format!("{} {}", leader, body.join(" ")))
            }
        }
        None => {
            let before = before.trim_end();
            Some(match (before.is_empty(), after.is_empty()) {
                (true, _) => after.to_string(),
                (false, true) => before.to_string(),
                (false, false) => format!("{} {}", before, after),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternRule;
    use crate::finding::NaturalKey;
    use crate::patterns::compiler::compile_patterns;
    use crate::store::RecordStatus;
    use std::fs;

    fn todo() -> Regex {
        Regex::new(r"\bTODO\b").unwrap()
    }

    #[test]
    fn marker_stripping_cases() {
        let re = todo();
        assert_eq!(strip_marker("x = 1  # TODO remove", &re).unwrap(), "x = 1");
        assert_eq!(strip_marker("# TODO: wire retries", &re).unwrap(), "# wire retries");
        assert_eq!(strip_marker("// TODO(ana) - handle EOF", &re).unwrap(), "// handle EOF");
        assert_eq!(strip_marker("# TODO", &re).unwrap(), "");
        assert_eq!(strip_marker("/* TODO */", &re).unwrap(), "");
        assert_eq!(strip_marker("<!-- TODO: menu -->", &re).unwrap(), "<!-- menu -->");
        assert_eq!(strip_marker("TODO: remove this", &re).unwrap(), "remove this");
        assert!(strip_marker("nothing here", &re).is_none());
    }

    #[test]
    fn template_rewriter_keeps_known_tokens() {
        let rewriter = TemplateTokenRewriter::new(["USER"]);
        let window = vec!["greet = \"{{USER}} {{ SECRET }}\"".to_string()];
        let request = RewriteRequest {
            file: "a.txt",
            line: 1,
            pattern: "template_token",
            target: &window[0],
            window: &window,
            window_start: 1,
        };
        assert_eq!(rewriter.rewrite(&request).unwrap(), "greet = \"{{USER}} \"");
    }

    fn open_record(id: i64, file: &str, line: usize, pattern: &str, context: &str) -> Record {
        Record {
            id,
            key: NaturalKey {
                file: file.into(),
                line,
                pattern: pattern.into(),
                context: context.into(),
            },
            suggestion: None,
            created_at: "t".into(),
            author: "a".into(),
            status: RecordStatus::Open,
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn generator_renders_descriptions_and_picks_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.html");
        fs::write(&file, "<h1>\n  {{TITLE}}\n</h1>\n").unwrap();
        let file = file.to_string_lossy().into_owned();

        let patterns = compile_patterns(&[
            PatternRule { name: "todo".into(), pattern: r"\bTODO\b".into(), ..Default::default() },
            PatternRule {
                name: "template_token".into(),
                pattern: r"\{\{\s*\w+\s*\}\}".into(),
                kind: PatternKind::Stub,
                ..Default::default()
            },
        ])
        .unwrap();
        let settings = TaskSettings::default();
        let rewriter = TemplateTokenRewriter::default();
        let generator = TaskGenerator::new(&patterns, &settings).with_rewriter(&rewriter);

        let records = vec![
            open_record(1, "a.py", 3, "todo", "x = 1  # TODO remove"),
            open_record(2, &file, 2, "template_token", "{{TITLE}}"),
            open_record(3, "a.py", 9, "retired", "# WIP"),
        ];
        let tasks = generator.generate(&records).unwrap();

        assert_eq!(tasks[0].description, "Remove todo placeholder in a.py at line 3");
        assert_eq!(tasks[0].suggestion, "x = 1");
        assert_eq!(tasks[0].strategy, SuggestionStrategy::MarkerStrip);
        assert_eq!(tasks[1].suggestion, "");
        assert_eq!(tasks[1].strategy, SuggestionStrategy::Rewriter);
        assert_eq!(tasks[2].suggestion, "# WIP");
        assert!(!tasks[2].is_actionable());
    }

    #[test]
    fn stub_without_rewriter_is_unchanged() {
        let patterns = compile_patterns(&[PatternRule {
            name: "bare_pass".into(),
            pattern: r"^\s*pass\s*$".into(),
            kind: PatternKind::Stub,
            ..Default::default()
        }])
        .unwrap();
        let settings = TaskSettings::default();
        let tasks = TaskGenerator::new(&patterns, &settings)
            .generate(&[open_record(1, "missing.py", 2, "bare_pass", "pass")])
            .unwrap();
        assert_eq!(tasks[0].strategy, SuggestionStrategy::Unchanged);
        assert_eq!(tasks[0].suggestion, "pass");
    }
}
