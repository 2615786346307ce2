// stubwatch-core/src/oracle.rs
//! Validation oracles: external pass/fail judges for remediated files.

use log::{debug, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum OracleVerdict {
    Pass,
    Fail(String),
}

impl OracleVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, OracleVerdict::Pass)
    }
}

/// Judges whether a set of files is acceptable after a mutation.
pub trait ValidationOracle {
    fn validate(&self, files: &[PathBuf]) -> OracleVerdict;
}

impl<F> ValidationOracle for F
where
    F: Fn(&[PathBuf]) -> bool,
{
    fn validate(&self, files: &[PathBuf]) -> OracleVerdict {
        if self(files) {
            OracleVerdict::Pass
        } else {
            OracleVerdict::Fail("validator rejected the change".to_string())
        }
    }
}

/// Runs an external program with the file paths appended to its arguments.
/// Exit status 0 passes; anything else, including failure to spawn, fails.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace (`"python -m py_compile"`).
    /// Returns `None` for a blank command line.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl ValidationOracle for CommandOracle {
    fn validate(&self, files: &[PathBuf]) -> OracleVerdict {
        debug!("Running validator {} {:?} on {} file(s)", self.program, self.args, files.len());
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(files)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => OracleVerdict::Pass,
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let reason = format!("{} exited with {}: {}", self.program, out.status, stderr.trim());
                debug!("Validator rejected change: {}", reason);
                OracleVerdict::Fail(reason)
            }
            Err(e) => {
                warn!("Could not run validator {}: {}", self.program, e);
                OracleVerdict::Fail(format!("could not run {}: {}", self.program, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_oracles() {
        let pass = |_: &[PathBuf]| true;
        let fail = |_: &[PathBuf]| false;
        assert!(pass.validate(&[]).passed());
        assert!(!fail.validate(&[]).passed());
    }

    #[test]
    fn missing_program_fails() {
        let oracle = CommandOracle::new("stubwatch-no-such-validator", vec![]);
        assert!(matches!(oracle.validate(&[]), OracleVerdict::Fail(_)));
    }

    #[test]
    fn blank_command_line_is_rejected() {
        assert!(CommandOracle::from_command_line("   ").is_none());
        let oracle = CommandOracle::from_command_line("python -m py_compile").unwrap();
        assert_eq!(oracle.program, "python");
        assert_eq!(oracle.args, vec!["-m", "py_compile"]);
    }
}
