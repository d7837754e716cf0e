//! Host collaborators for interface-bound application supervision
//!
//! This crate wraps the OS surfaces the supervisor depends on: the process
//! table, signals, launching the supervised application, its cooperative
//! quit channel, and network interface enumeration.

#![warn(missing_docs)]

pub mod app;
pub mod backends;
pub mod command;
pub mod error;
pub mod interfaces;
pub mod process;
pub mod quit;

pub use app::{AppSpec, LaunchSpec, SupervisedProcess};
pub use backends::LocalProcessControl;
pub use command::Command;
pub use error::{Error, Result};
pub use interfaces::{Interface, IpFamily};
pub use process::{ExitNotifier, ProcessControl};
pub use quit::{CommandQuitChannel, QuitChannel, SignalQuitChannel};
