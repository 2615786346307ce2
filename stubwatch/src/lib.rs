// stubwatch/src/lib.rs
//! # stubwatch CLI Application
//!
//! Command-line front end for `stubwatch-core`: argument parsing, logger
//! setup, the subcommands and their terminal output.
//!
//! License: MIT OR APACHE 2.0

pub mod cli;
pub mod commands;
pub mod logger;
pub mod ui;
