//! Leak-free interface binding for a supervised application
//!
//! The application reads its interface binding once at startup. This crate
//! changes that binding without a window in which the application could
//! send traffic over the wrong interface: it terminates the application,
//! confirms with the OS that it is gone, durably commits the new binding and
//! only then starts a fresh instance.
//!
//! ```no_run
//! use clutch_core::{system, ClutchConfig};
//!
//! # async fn example() -> clutch_core::Result<()> {
//! let config = ClutchConfig::load_or_default("clutch.yaml")?;
//! let binder = system::connect(&config).await?;
//!
//! binder.bind_to_interface_named("utun3").await?;
//! assert_eq!(binder.current_binding().await?.map(|i| i.name), Some("utun3".into()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod binder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graceful;
pub mod permission;
pub mod reaper;
pub mod system;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use binder::{Collaborators, InterfaceBinder, Rebind};
pub use catalog::{InterfaceCatalog, SystemCatalog};
pub use config::ClutchConfig;
pub use error::{CommitStage, Error, Result};
pub use graceful::GracefulQuit;
pub use permission::{PermissionGate, SignalPermission, StaticPermission};
pub use reaper::{ConfirmedTermination, PendingTermination, Reaper, TerminationStrategy, Timeouts};

pub use binding_store::BindingState;
pub use host_control::{AppSpec, Interface, IpFamily, SupervisedProcess};
