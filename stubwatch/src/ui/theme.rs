// stubwatch/src/ui/theme.rs
//! Module for managing the application's command-line interface (CLI) theme.
//!
//! A theme maps each logical output element to an optional 16-color ANSI
//! foreground. Themes load from YAML files; entries a file leaves out keep
//! their default colour.

use anyhow::{Context, Result};
use owo_colors::AnsiColors;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Type alias for the theme map, providing a consistent type definition.
pub type ThemeMap = HashMap<ThemeEntry, ThemeStyle>;

/// The different logical parts of the output that can be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeEntry {
    /// Section titles and table captions.
    Header,
    Success,
    Info,
    Warn,
    Error,
    /// Lines added in a diff view.
    DiffAdded,
    /// Lines removed in a diff view.
    DiffRemoved,
    /// File and hunk headers of a diff view.
    DiffHeader,
    /// Counts of records still OPEN.
    OpenCount,
    /// Counts of RESOLVED records.
    ResolvedCount,
}

impl ThemeEntry {
    pub const ALL: [ThemeEntry; 10] = [
        ThemeEntry::Header,
        ThemeEntry::Success,
        ThemeEntry::Info,
        ThemeEntry::Warn,
        ThemeEntry::Error,
        ThemeEntry::DiffAdded,
        ThemeEntry::DiffRemoved,
        ThemeEntry::DiffHeader,
        ThemeEntry::OpenCount,
        ThemeEntry::ResolvedCount,
    ];
}

/// Represents an ANSI color that can be used in the theme.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ThemeColor {
    /// A named ANSI color (e.g., "red", "brightgreen").
    Named(String),
}

/// Error type for parsing an invalid `ThemeColor` string.
#[derive(Debug, Clone)]
pub struct ParseThemeColorError;

impl fmt::Display for ParseThemeColorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Invalid theme color; expected one of: black, red, green, yellow, blue, \
            magenta, cyan, white, brightblack, brightred, brightgreen, brightyellow, \
            brightblue, brightmagenta, brightcyan, brightwhite."
        )
    }
}

impl std::error::Error for ParseThemeColorError {}

impl FromStr for ThemeColor {
    type Err = ParseThemeColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "black" | "red" | "green" | "yellow" | "blue" | "magenta" | "cyan" | "white" | "brightblack"
            | "brightred" | "brightgreen" | "brightyellow" | "brightblue" | "brightmagenta" | "brightcyan"
            | "brightwhite" => Ok(ThemeColor::Named(lower)),
            _ => Err(ParseThemeColorError),
        }
    }
}

impl ThemeColor {
    /// Converts the `ThemeColor` into its `owo_colors::AnsiColors` counterpart.
    /// Unknown names fall back to white.
    pub fn to_ansi_color(&self) -> AnsiColors {
        match self {
            ThemeColor::Named(name) => match name.to_lowercase().as_str() {
                "black" => AnsiColors::Black,
                "red" => AnsiColors::Red,
                "green" => AnsiColors::Green,
                "yellow" => AnsiColors::Yellow,
                "blue" => AnsiColors::Blue,
                "magenta" => AnsiColors::Magenta,
                "cyan" => AnsiColors::Cyan,
                "white" => AnsiColors::White,
                "brightblack" => AnsiColors::BrightBlack,
                "brightred" => AnsiColors::BrightRed,
                "brightgreen" => AnsiColors::BrightGreen,
                "brightyellow" => AnsiColors::BrightYellow,
                "brightblue" => AnsiColors::BrightBlue,
                "brightmagenta" => AnsiColors::BrightMagenta,
                "brightcyan" => AnsiColors::BrightCyan,
                "brightwhite" => AnsiColors::BrightWhite,
                _ => AnsiColors::White,
            },
        }
    }
}

/// Represents the style configuration for a specific `ThemeEntry`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThemeStyle {
    pub fg: Option<ThemeColor>,
}

impl ThemeStyle {
    fn named(color: &str) -> Self {
        ThemeStyle {
            fg: Some(ThemeColor::Named(color.to_string())),
        }
    }

    /// Loads a theme from a YAML file and fills in defaults for missing entries.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ThemeMap> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read theme file {}", path.display()))?;
        let mut custom: ThemeMap = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse theme file {}", path.display()))?;

        for (entry, style) in ThemeStyle::default_theme_map() {
            custom.entry(entry).or_insert(style);
        }
        Ok(custom)
    }

    /// Returns the built-in theme.
    pub fn default_theme_map() -> ThemeMap {
        let mut theme = HashMap::new();
        theme.insert(ThemeEntry::Success, ThemeStyle::named("green"));
        theme.insert(ThemeEntry::Warn, ThemeStyle::named("yellow"));
        theme.insert(ThemeEntry::Error, ThemeStyle::named("red"));
        theme.insert(ThemeEntry::DiffAdded, ThemeStyle::named("green"));
        theme.insert(ThemeEntry::DiffRemoved, ThemeStyle::named("red"));
        theme.insert(ThemeEntry::DiffHeader, ThemeStyle::named("cyan"));
        theme.insert(ThemeEntry::OpenCount, ThemeStyle::named("yellow"));
        theme.insert(ThemeEntry::ResolvedCount, ThemeStyle::named("green"));
        for entry in ThemeEntry::ALL {
            theme.entry(entry).or_insert_with(|| ThemeStyle::named("white"));
        }
        theme
    }
}

/// Loads a theme configuration from a YAML file or returns the default theme.
pub fn build_theme_map(theme_path: Option<&PathBuf>) -> Result<ThemeMap> {
    match theme_path {
        Some(path) => ThemeStyle::load_from_file(path),
        None => Ok(ThemeStyle::default_theme_map()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_named_colors() {
        assert!("red".parse::<ThemeColor>().is_ok());
        assert!("BrightGreen".parse::<ThemeColor>().is_ok());
        assert!("unknown".parse::<ThemeColor>().is_err());
    }

    #[test]
    fn default_theme_covers_every_entry() {
        let theme = ThemeStyle::default_theme_map();
        for entry in ThemeEntry::ALL {
            assert!(theme.contains_key(&entry), "{:?} missing", entry);
        }
    }

    #[test]
    fn theme_file_overrides_and_keeps_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "error:\n  fg: magenta")?;
        let theme = build_theme_map(Some(&file.path().to_path_buf()))?;
        assert_eq!(theme[&ThemeEntry::Error].fg, Some(ThemeColor::Named("magenta".into())));
        assert_eq!(theme[&ThemeEntry::DiffAdded].fg, Some(ThemeColor::Named("green".into())));
        Ok(())
    }
}
