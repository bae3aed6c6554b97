//! Worker command lines
//!
//! A worker is always started from an explicit argv. Command strings coming from
//! the environment are split with shell-word rules and are never handed to a shell.

use std::fmt;
use std::str::FromStr;

use super::SpawnError;

/// Program plus arguments for a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build from an argv list (first element is the program)
    pub fn from_argv<I, S>(argv: I) -> Result<Self, SpawnError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = argv.into_iter().map(Into::into);
        let program = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(SpawnError::EmptyCommand)?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Split a command line with shell quoting rules, without a shell
    pub fn parse(cmd: &str) -> Result<Self, SpawnError> {
        let parts = shlex::split(cmd).ok_or_else(|| SpawnError::InvalidCommand(cmd.to_string()))?;
        Self::from_argv(parts)
    }
}

impl FromStr for WorkerCommand {
    type Err = SpawnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(joined) => f.write_str(&joined),
            Err(_) => write!(f, "{} {:?}", self.program, self.args),
        }
    }
}
