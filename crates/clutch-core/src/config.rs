//! Supervisor configuration
//!
//! Loaded from a YAML file such as:
//!
//! ```yaml
//! app:
//!   bundle_id: org.m0k.transmission
//!   process_name: transmission-gtk
//!   launch:
//!     program: transmission-gtk
//!     args: ["--minimized"]
//! quit:
//!   type: command
//!   program: transmission-remote
//!   args: ["--exit"]
//! store:
//!   backend: file
//!   path: /home/me/.config/clutch/binding.json
//! timeouts:
//!   poll_interval_ms: 100
//!   graceful_quit_secs: 10
//!   kill_secs: 5
//!   forced_retries: 1
//! ```
//!
//! Every section is optional and falls back to the defaults below.

use crate::reaper::Timeouts;
use crate::{Error, Result};
use host_control::{AppSpec, Command};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Bundle identifier of the default supervised application
pub const DEFAULT_BUNDLE_ID: &str = "org.m0k.transmission";

/// Process name of the default supervised application
pub const DEFAULT_PROCESS_NAME: &str = "transmission-gtk";

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutchConfig {
    /// The supervised application
    pub app: AppSpec,
    /// How to ask it to quit cooperatively
    pub quit: QuitConfig,
    /// Where the binding preference lives
    pub store: StoreConfig,
    /// Bounds on every wait in the rebind protocol
    pub timeouts: TimeoutConfig,
}

impl Default for ClutchConfig {
    fn default() -> Self {
        Self {
            app: AppSpec::new(DEFAULT_BUNDLE_ID, DEFAULT_PROCESS_NAME),
            quit: QuitConfig::default(),
            store: StoreConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Cooperative quit channel selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuitConfig {
    /// Send SIGTERM
    #[default]
    Signal,
    /// Run a program that tells the application to quit
    Command {
        /// Program to execute
        program: String,
        /// Command line arguments
        #[serde(default)]
        args: Vec<String>,
    },
}

impl QuitConfig {
    /// The command to run, for command channels
    pub fn command(&self) -> Option<Command> {
        match self {
            QuitConfig::Signal => None,
            QuitConfig::Command { program, args } => {
                Some(Command::new(program).args(args))
            }
        }
    }
}

/// Binding store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON document replaced atomically on commit
    #[default]
    File,
    /// Sled database
    Sled,
}

/// Binding store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backend to use
    pub backend: StoreBackend,
    /// Explicit location; defaults under the user config directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Location of the store, falling back to the user config directory
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let file = match self.backend {
            StoreBackend::File => "binding.json",
            StoreBackend::Sled => "binding.db",
        };
        config_home()
            .map(|dir| dir.join(file))
            .ok_or_else(|| Error::Config("no user config directory; set store.path".to_string()))
    }
}

/// Timing bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Interval between process table polls
    pub poll_interval_ms: u64,
    /// How long a cooperative quit may take before forced termination
    pub graceful_quit_secs: u64,
    /// How long to wait after each forced kill
    pub kill_secs: u64,
    /// Extra forced kills before reporting a timeout
    pub forced_retries: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let defaults = Timeouts::default();
        Self {
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            graceful_quit_secs: defaults.graceful_quit.as_secs(),
            kill_secs: defaults.kill.as_secs(),
            forced_retries: defaults.forced_retries,
        }
    }
}

impl TimeoutConfig {
    /// Convert to the durations used by the supervisor
    pub fn to_timeouts(&self) -> Timeouts {
        Timeouts {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            graceful_quit: Duration::from_secs(self.graceful_quit_secs),
            kill: Duration::from_secs(self.kill_secs),
            forced_retries: self.forced_retries,
        }
    }
}

impl ClutchConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        config_home().map(|dir| dir.join("clutch.yaml"))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClutchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading configuration from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            info!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.app.bundle_id.trim().is_empty() {
            return Err(Error::Config("app.bundle_id must not be empty".to_string()));
        }
        if self.app.process_name.trim().is_empty() {
            return Err(Error::Config("app.process_name must not be empty".to_string()));
        }
        if self.app.launch.program.trim().is_empty() {
            return Err(Error::Config("app.launch.program must not be empty".to_string()));
        }
        if let QuitConfig::Command { program, .. } = &self.quit {
            if program.trim().is_empty() {
                return Err(Error::Config("quit.program must not be empty".to_string()));
            }
        }

        let timeouts = &self.timeouts;
        if timeouts.poll_interval_ms == 0 || timeouts.graceful_quit_secs == 0 || timeouts.kill_secs == 0
        {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }

        Ok(())
    }
}

fn config_home() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clutch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClutchConfig::default();
        assert_eq!(config.app.bundle_id, DEFAULT_BUNDLE_ID);
        assert_eq!(config.app.process_name, DEFAULT_PROCESS_NAME);
        assert_eq!(config.quit, QuitConfig::Signal);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.timeouts.to_timeouts(), Timeouts::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ClutchConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ClutchConfig::default());
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r#"
app:
  bundle_id: com.example.app
  process_name: example-app
  launch:
    program: /opt/example/example-app
    args: ["--headless"]
quit:
  type: command
  program: example-ctl
  args: ["quit"]
store:
  backend: sled
  path: /var/lib/clutch/binding.db
timeouts:
  poll_interval_ms: 50
  kill_secs: 2
"#;
        let config = ClutchConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.app.bundle_id, "com.example.app");
        assert_eq!(config.app.launch.args, vec!["--headless".to_string()]);
        assert_eq!(
            config.quit.command().unwrap().display(),
            "example-ctl quit"
        );
        assert_eq!(config.store.backend, StoreBackend::Sled);
        assert_eq!(
            config.store.resolved_path().unwrap(),
            PathBuf::from("/var/lib/clutch/binding.db")
        );

        let timeouts = config.timeouts.to_timeouts();
        assert_eq!(timeouts.poll_interval, Duration::from_millis(50));
        assert_eq!(timeouts.kill, Duration::from_secs(2));
        assert_eq!(timeouts.graceful_quit, Timeouts::default().graceful_quit);
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        let yaml = "timeouts:\n  kill_secs: 0\n";
        let err = ClutchConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation_rejects_empty_quit_program() {
        let yaml = "quit:\n  type: command\n  program: \"\"\n";
        assert!(ClutchConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClutchConfig::load_or_default(dir.path().join("clutch.yaml")).unwrap();
        assert_eq!(config, ClutchConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clutch.yaml");
        std::fs::write(&path, "quit:\n  type: signal\n").unwrap();

        let config = ClutchConfig::from_file(&path).unwrap();
        assert_eq!(config.quit, QuitConfig::Signal);
    }
}
