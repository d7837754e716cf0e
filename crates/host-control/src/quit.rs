//! Cooperative quit channels
//!
//! A quit channel asks the supervised application to shut itself down
//! through a path it listens on, so it can flush its own state first.

use crate::app::{AppSpec, SupervisedProcess};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::ProcessControl;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A way to request a cooperative shutdown
#[async_trait]
pub trait QuitChannel: Send + Sync {
    /// Ask `process` to quit; returns once the request is delivered
    async fn request_quit(&self, app: &AppSpec, process: &SupervisedProcess) -> Result<()>;
}

/// Quit by SIGTERM, which most Unix applications treat as a polite request
pub struct SignalQuitChannel {
    control: Arc<dyn ProcessControl>,
}

impl SignalQuitChannel {
    /// Create a signal-based quit channel
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl QuitChannel for SignalQuitChannel {
    async fn request_quit(&self, app: &AppSpec, process: &SupervisedProcess) -> Result<()> {
        let Some(pid) = process.pid else {
            return Ok(());
        };
        debug!(bundle_id = %app.bundle_id, pid, "requesting quit via SIGTERM");
        self.control.terminate(pid, false).await
    }
}

/// Quit by running an application-specific command, e.g. `transmission-remote --exit`
pub struct CommandQuitChannel {
    command: Command,
}

impl CommandQuitChannel {
    /// Create a command-based quit channel
    pub fn new(command: Command) -> Self {
        Self { command }
    }
}

#[async_trait]
impl QuitChannel for CommandQuitChannel {
    async fn request_quit(&self, app: &AppSpec, _process: &SupervisedProcess) -> Result<()> {
        debug!(bundle_id = %app.bundle_id, "requesting quit via `{}`", self.command.display());

        let status = self.command.prepare().status().await.map_err(|e| {
            Error::spawn_failed(format!(
                "failed to run `{}`: {}",
                self.command.display(),
                e
            ))
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::QuitCommandFailed {
                command: self.command.display(),
                code: status.code(),
            })
        }
    }
}
