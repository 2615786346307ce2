// stubwatch/src/ui/diff_viewer.rs
//! Unified diff output for `apply --dry-run`.
//!
//! Removed lines are painted with `DiffRemoved`, added lines with `DiffAdded`,
//! file and hunk headers with `DiffHeader`.

use diffy::{create_patch, Line as DiffLine};
use std::io::{self, Write};

use crate::ui::output_format::paint;
use crate::ui::theme::{ThemeEntry, ThemeMap};

/// Writes a unified diff of `original` against `remediated` for `file`.
/// Returns whether the two differ.
pub fn print_diff<W: Write>(
    file: &str,
    original: &str,
    remediated: &str,
    writer: &mut W,
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<bool> {
    let patch = create_patch(original, remediated);
    if patch.hunks().is_empty() {
        return Ok(false);
    }

    writeln!(writer, "{}", paint(&format!("--- {file}"), ThemeEntry::DiffHeader, theme, supports_color))?;
    writeln!(writer, "{}", paint(&format!("+++ {file}"), ThemeEntry::DiffHeader, theme, supports_color))?;

    for hunk in patch.hunks() {
        let old = hunk.old_range();
        let new = hunk.new_range();
        let header = format!("@@ -{},{} +{},{} @@", old.start(), old.len(), new.start(), new.len());
        writeln!(writer, "{}", paint(&header, ThemeEntry::DiffHeader, theme, supports_color))?;

        for line_change in hunk.lines() {
            let (marker, text, entry) = match line_change {
                DiffLine::Delete(s) => ("-", *s, Some(ThemeEntry::DiffRemoved)),
                DiffLine::Insert(s) => ("+", *s, Some(ThemeEntry::DiffAdded)),
                DiffLine::Context(s) => (" ", *s, None),
            };
            let body = format!("{marker}{}", text.trim_end_matches(['\n', '\r']));
            match entry {
                Some(entry) => writeln!(writer, "{}", paint(&body, entry, theme, supports_color))?,
                None => writeln!(writer, "{body}")?,
            }
        }
    }
    Ok(true)
}
