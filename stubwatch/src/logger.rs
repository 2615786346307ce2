// stubwatch/src/logger.rs
//! Logger setup for the stubwatch CLI.
//!
//! Logs go to stderr through `env_logger`. `RUST_LOG` is honoured unless the
//! caller passes an explicit level (from `--quiet`, `--debug` or
//! `--disable-debug`), which then wins.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initialises the global logger. Calling it twice is harmless.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).format_target(false);
    let _ = builder.try_init();
}

/// Maps the global CLI flags to a level override.
pub fn level_from_flags(quiet: bool, debug: bool, disable_debug: bool) -> Option<LevelFilter> {
    if quiet {
        Some(LevelFilter::Error)
    } else if debug && !disable_debug {
        Some(LevelFilter::Debug)
    } else if disable_debug {
        Some(LevelFilter::Info)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_debug() {
        assert_eq!(level_from_flags(true, true, false), Some(LevelFilter::Error));
        assert_eq!(level_from_flags(false, true, false), Some(LevelFilter::Debug));
        assert_eq!(level_from_flags(false, true, true), Some(LevelFilter::Info));
        assert_eq!(level_from_flags(false, false, false), None);
    }
}
