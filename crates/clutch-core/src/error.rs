//! Error types for binding supervision

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the supervisor
///
/// Each protocol failure maps to exactly one variant so callers can choose
/// between retrying, prompting for permission and relaunching by hand.
#[derive(Error, Debug)]
pub enum Error {
    /// The supervisor lacks the OS privilege to observe or kill the application
    #[error("Permission denied: not allowed to control {bundle_id}")]
    PermissionDenied {
        /// Application that could not be controlled
        bundle_id: String,
    },

    /// The application did not exit, even after forced kills
    #[error("{bundle_id} did not exit within {waited:?}")]
    TerminationTimeout {
        /// Application that would not exit
        bundle_id: String,
        /// How long termination was attempted
        waited: Duration,
    },

    /// The termination watcher stopped before it could report
    #[error("Termination watcher for {bundle_id} stopped before confirming exit")]
    TerminationInterrupted {
        /// Application being terminated
        bundle_id: String,
    },

    /// The binding was committed but the application could not be relaunched
    #[error("Binding committed but {bundle_id} could not be relaunched: {source}")]
    RestartFailed {
        /// Application that failed to start
        bundle_id: String,
        /// Why the launch failed
        #[source]
        source: host_control::Error,
    },

    /// A durable write to the binding store failed
    ///
    /// Staged values are rolled back to the last committed state before this
    /// is returned.
    #[error("Failed to commit {stage}: {source}")]
    StoreCommitFailed {
        /// Which write failed
        stage: CommitStage,
        /// Why the commit failed
        #[source]
        source: binding_store::Error,
    },

    /// Reading the binding store failed
    #[error("Binding store error: {0}")]
    Store(#[from] binding_store::Error),

    /// Process table, signal or interface query failed
    #[error("Host control error: {0}")]
    Host(#[from] host_control::Error),

    /// No interface with this name exists
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// The applied interface is recorded but not currently present
    #[error("Bound interface {0} is not currently available")]
    InterfaceUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether trying the same operation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TerminationTimeout { .. }
                | Error::TerminationInterrupted { .. }
                | Error::StoreCommitFailed { .. }
        )
    }

    /// Whether the operator must grant a privilege first
    pub fn needs_permission(&self) -> bool {
        matches!(self, Error::PermissionDenied { .. })
    }

    /// Whether the application was left stopped and must be relaunched
    pub fn needs_relaunch(&self) -> bool {
        matches!(self, Error::RestartFailed { .. })
    }

    /// Map a host error for `bundle_id`, surfacing `EPERM` as a permission error
    pub(crate) fn from_host(bundle_id: &str, error: host_control::Error) -> Self {
        match error {
            host_control::Error::PermissionDenied { .. } => Error::PermissionDenied {
                bundle_id: bundle_id.to_string(),
            },
            other => Error::Host(other),
        }
    }
}

/// The store write a [`Error::StoreCommitFailed`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    /// The new target, written after the application was confirmed gone
    ///
    /// The previous binding is still in effect. If the application was
    /// running it has been stopped and is not relaunched.
    Target,
    /// The applied interface, written after the application was relaunched
    ///
    /// The application already runs with the new target, which is committed;
    /// only the record of it is missing.
    Applied,
    /// A setting unrelated to the binding
    Setting,
}

impl std::fmt::Display for CommitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitStage::Target => write!(f, "target interface"),
            CommitStage::Applied => write!(f, "applied interface"),
            CommitStage::Setting => write!(f, "setting"),
        }
    }
}

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_outcomes_do_not_overlap() {
        let errors = [
            Error::PermissionDenied {
                bundle_id: "com.example.app".to_string(),
            },
            Error::TerminationTimeout {
                bundle_id: "com.example.app".to_string(),
                waited: Duration::from_secs(5),
            },
            Error::RestartFailed {
                bundle_id: "com.example.app".to_string(),
                source: host_control::Error::spawn_failed("no such file"),
            },
        ];

        for error in &errors {
            let outcomes = [
                error.is_retryable(),
                error.needs_permission(),
                error.needs_relaunch(),
            ];
            assert_eq!(outcomes.iter().filter(|o| **o).count(), 1, "{error}");
        }
    }

    #[test]
    fn test_eperm_maps_to_permission_denied() {
        let error = Error::from_host(
            "com.example.app",
            host_control::Error::PermissionDenied { pid: 7 },
        );
        assert!(error.needs_permission());

        let error = Error::from_host("com.example.app", host_control::Error::spawn_failed("x"));
        assert!(matches!(error, Error::Host(_)));
    }
}
