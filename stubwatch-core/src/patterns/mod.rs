//! Pattern handling for the scanner.
//!
//! Patterns arrive as `PatternRule`s from configuration and are compiled once
//! into `CompiledPatterns`, which the scanner applies line by line. Pattern
//! order is preserved end to end because it is part of finding order.

pub mod compiler;
