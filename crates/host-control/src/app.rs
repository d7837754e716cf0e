//! Identity of the supervised application

use crate::command::Command;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How to start the supervised application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Program to execute
    pub program: String,
    /// Command line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Build the launch command
    pub fn command(&self) -> Command {
        self.env.iter().fold(
            Command::new(&self.program).args(&self.args),
            |cmd, (key, value)| cmd.env(key, value),
        )
    }
}

/// The application under supervision
///
/// `bundle_id` names the application in logs and errors. `process_name` is
/// matched exactly against the process table, so it must be the name the OS
/// reports (on Linux that is the executable name truncated to 15 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Stable identifier, e.g. `org.m0k.transmission`
    pub bundle_id: String,
    /// Name of the process as listed in the process table
    pub process_name: String,
    /// How to start it
    pub launch: LaunchSpec,
}

impl AppSpec {
    /// Create an app spec whose process name is the launched program's name
    pub fn new(bundle_id: impl Into<String>, program: impl Into<String>) -> Self {
        let program = program.into();
        let process_name = std::path::Path::new(&program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());

        Self {
            bundle_id: bundle_id.into(),
            process_name,
            launch: LaunchSpec {
                program,
                args: Vec::new(),
                env: BTreeMap::new(),
            },
        }
    }
}

/// A snapshot of the supervised process, rebuilt on every lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisedProcess {
    /// Application this snapshot belongs to
    pub bundle_id: String,
    /// Lowest live pid, if any instance is running
    pub pid: Option<u32>,
    /// Whether any instance is running
    pub running: bool,
}

impl SupervisedProcess {
    /// Snapshot of an application with no live instance
    pub fn absent(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            pid: None,
            running: false,
        }
    }

    /// Snapshot of a running instance
    pub fn running(bundle_id: impl Into<String>, pid: u32) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            pid: Some(pid),
            running: true,
        }
    }
}
