//! Error types for host process and interface control

use thiserror::Error;

/// Unified error type for host control operations
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal} to pid {pid}: {reason}")]
    SignalFailed {
        /// The target process
        pid: u32,
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// The caller is not allowed to signal the process
    #[error("not permitted to signal pid {pid}")]
    PermissionDenied {
        /// The process that refused the signal
        pid: u32,
    },

    /// A quit command ran but reported failure
    #[error("quit command `{command}` exited with {code:?}")]
    QuitCommandFailed {
        /// The program that was run
        command: String,
        /// Its exit code, if it exited normally
        code: Option<i32>,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (signals, getifaddrs)
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(pid: u32, signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            pid,
            signal,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
