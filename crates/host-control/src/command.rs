//! Reusable command lines for launching and quitting the application

use async_process::{Command as AsyncCommand, Stdio};
use std::collections::BTreeMap;
use std::fmt;

/// A program invocation that can be run any number of times
///
/// `async_process::Command` is consumed by spawning; this one is kept in the
/// configuration and turned into a fresh process command for every relaunch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl Command {
    /// Invoke `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program to run
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, in order
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables
    pub fn envs(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// The command line as it would be typed, for log messages
    pub fn display(&self) -> String {
        self.to_string()
    }

    /// A process command with stdio detached
    ///
    /// The supervised application outlives the supervisor, so it must not
    /// hold pipes that nobody reads.
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
