// stubwatch/src/ui/mod.rs
//! Terminal output for the stubwatch CLI: themed messages, tables and diffs.

pub mod diff_viewer;
pub mod output_format;
pub mod tables;
pub mod theme;
