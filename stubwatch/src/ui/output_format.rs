// stubwatch/src/ui/output_format.rs
//! Themed one-line messages for stderr and coloured fragments for stdout.

use owo_colors::OwoColorize;
use std::io::{self, Write};

use crate::ui::theme::{ThemeEntry, ThemeMap};

/// Renders `text` in the colour of `entry`, or plain when colour is off.
pub fn paint(text: &str, entry: ThemeEntry, theme: &ThemeMap, supports_color: bool) -> String {
    match theme.get(&entry).and_then(|style| style.fg.as_ref()) {
        Some(color) if supports_color => text.color(color.to_ansi_color()).to_string(),
        _ => text.to_string(),
    }
}

fn print_message<W: Write>(
    writer: &mut W,
    prefix: &str,
    msg: &str,
    entry: ThemeEntry,
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<()> {
    let line = format!("{prefix}{msg}");
    writeln!(writer, "{}", paint(&line, entry, theme, supports_color))
}

pub fn print_info_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "", msg, ThemeEntry::Info, theme, supports_color)
}

pub fn print_success_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "", msg, ThemeEntry::Success, theme, supports_color)
}

pub fn print_warn_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "Warning: ", msg, ThemeEntry::Warn, theme, supports_color)
}

pub fn print_error_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "Error: ", msg, ThemeEntry::Error, theme, supports_color)
}
