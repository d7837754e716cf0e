//! Interface binder
//!
//! Changing the binding is only safe while the application is down: it reads
//! the preference once at startup and keeps its sockets for its whole life.
//! Every change therefore runs the same ordered protocol:
//!
//! 1. check the permission gate, with no side effects on refusal
//! 2. ask the application to quit, if graceful restarts are enabled
//! 3. kill and wait until the OS reports every instance gone
//! 4. stage and commit the new target
//! 5. launch a fresh instance, if one was running
//! 6. stage and commit the applied interface
//!
//! Each step aborts the rest on failure. Rebinds are serialised per binder,
//! and the idempotency check runs only after the guard is held, against
//! whatever the previous holder committed.

use crate::catalog::{self, InterfaceCatalog};
use crate::graceful::GracefulQuit;
use crate::permission::PermissionGate;
use crate::reaper::{Reaper, Timeouts};
use crate::error::CommitStage;
use crate::{Error, Result};
use binding_store::{BindingState, BindingStore, KeyValueStore};
use futures::lock::Mutex;
use host_control::{AppSpec, Interface, ProcessControl, QuitChannel, SupervisedProcess};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a rebind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Rebind {
    /// The requested binding was already committed and applied
    Unchanged,
    /// The protocol ran to completion
    Applied {
        /// Whether a fresh instance was launched
        relaunched: bool,
        /// Pid of the fresh instance
        pid: Option<u32>,
    },
}

impl Rebind {
    /// Pid of the freshly launched instance, if one was started
    pub fn relaunched_pid(&self) -> Option<u32> {
        match self {
            Rebind::Applied { pid, .. } => *pid,
            Rebind::Unchanged => None,
        }
    }
}

/// OS and storage collaborators of an [`InterfaceBinder`]
#[derive(Clone)]
pub struct Collaborators {
    /// Process table, signals and launcher
    pub control: Arc<dyn ProcessControl>,
    /// Network interfaces
    pub catalog: Arc<dyn InterfaceCatalog>,
    /// Privilege check
    pub permissions: Arc<dyn PermissionGate>,
    /// Cooperative quit path
    pub quit: Arc<dyn QuitChannel>,
    /// Preference store shared with the application
    pub store: Arc<dyn KeyValueStore>,
}

/// Binds the supervised application to a network interface
pub struct InterfaceBinder {
    app: AppSpec,
    control: Arc<dyn ProcessControl>,
    catalog: Arc<dyn InterfaceCatalog>,
    permissions: Arc<dyn PermissionGate>,
    store: BindingStore,
    reaper: Reaper,
    graceful: GracefulQuit,
    guard: Mutex<()>,
}

impl InterfaceBinder {
    /// Create a binder for `app`
    pub fn new(app: AppSpec, collaborators: Collaborators, timeouts: Timeouts) -> Self {
        let Collaborators {
            control,
            catalog,
            permissions,
            quit,
            store,
        } = collaborators;

        let reaper = Reaper::new(control.clone(), timeouts);
        let graceful = GracefulQuit::new(
            reaper.clone(),
            permissions.clone(),
            quit,
            timeouts.graceful_quit,
        );

        Self {
            app,
            control,
            catalog,
            permissions,
            store: BindingStore::new(store),
            reaper,
            graceful,
            guard: Mutex::new(()),
        }
    }

    /// The supervised application
    pub fn app(&self) -> &AppSpec {
        &self.app
    }

    /// Termination supervisor used by the protocol
    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Graceful quit controller used by the protocol
    pub fn graceful(&self) -> &GracefulQuit {
        &self.graceful
    }

    /// Interfaces the application may be bound to; loopback is excluded
    pub async fn list_interfaces(&self) -> Result<Vec<Interface>> {
        let mut interfaces = self.catalog.interfaces().await?;
        interfaces.retain(|interface| !interface.is_loopback());
        Ok(interfaces)
    }

    /// The interface the running instance was started with, `None` if unbound
    ///
    /// Fails with [`Error::InterfaceUnavailable`] when the recorded interface
    /// no longer exists. Does not wait for a rebind in progress.
    pub async fn current_binding(&self) -> Result<Option<Interface>> {
        let Some(name) = self.store.state().await?.last_applied_name else {
            return Ok(None);
        };
        let interfaces = self.catalog.interfaces().await?;
        catalog::resolve(&interfaces, &name)
            .map(Some)
            .ok_or(Error::InterfaceUnavailable(name))
    }

    /// The interface the application should be bound to, `None` if unbound
    pub async fn target_interface_name(&self) -> Result<Option<String>> {
        Ok(self.store.state().await?.target_interface_name)
    }

    /// Target and applied interface together
    pub async fn binding_state(&self) -> Result<BindingState> {
        Ok(self.store.state().await?)
    }

    /// Current process table entry of the application
    pub async fn process(&self) -> Result<SupervisedProcess> {
        self.control
            .lookup(&self.app)
            .await
            .map_err(|e| Error::from_host(&self.app.bundle_id, e))
    }

    /// Whether the supervisor may control the application right now
    pub async fn has_permissions(&self) -> bool {
        self.permissions.has_permissions().await
    }

    /// Bind the application to `interface`
    pub async fn bind_to_interface(&self, interface: &Interface) -> Result<Rebind> {
        info!("Binding {} to {}", self.app.bundle_id, interface.name);
        self.rebind(Some(&interface.name), false).await
    }

    /// Bind the application to the interface called `name`
    pub async fn bind_to_interface_named(&self, name: &str) -> Result<Rebind> {
        let interfaces = self.list_interfaces().await?;
        let interface = catalog::resolve(&interfaces, name)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))?;
        self.bind_to_interface(&interface).await
    }

    /// Remove the binding; succeeds when already unbound
    pub async fn unbind_from_interface(&self) -> Result<Rebind> {
        info!("Unbinding {}", self.app.bundle_id);
        self.rebind(None, false).await
    }

    /// Restart the application without changing its binding
    pub async fn restart_application(&self) -> Result<Rebind> {
        info!("Restarting {}", self.app.bundle_id);
        let target = self.target_interface_name().await?;
        self.rebind(target.as_deref(), true).await
    }

    /// Whether restarts ask the application to quit first
    pub async fn restart_gracefully(&self) -> Result<bool> {
        Ok(self.store.restart_gracefully().await?)
    }

    /// Enable or disable the cooperative quit before restarts
    pub async fn set_restart_gracefully(&self, gracefully: bool) -> Result<()> {
        let _guard = self.guard.lock().await;
        let previous = self.store.restart_gracefully().await?;

        let staged = self.store.stage_restart_gracefully(gracefully).await;
        if let Err(source) = self.commit_staged(staged).await {
            if let Err(e) = self.store.stage_restart_gracefully(previous).await {
                warn!("Failed to roll back graceful restart setting: {}", e);
            }
            return Err(Error::StoreCommitFailed {
                stage: CommitStage::Setting,
                source,
            });
        }

        info!("Graceful restart {}", if gracefully { "enabled" } else { "disabled" });
        Ok(())
    }

    async fn rebind(&self, target: Option<&str>, force: bool) -> Result<Rebind> {
        let _guard = self.guard.lock().await;

        if !self.permissions.has_permissions().await {
            warn!("Not permitted to control {}", self.app.bundle_id);
            return Err(Error::PermissionDenied {
                bundle_id: self.app.bundle_id.clone(),
            });
        }

        // Failed commits are rolled back, so what is staged here is durable.
        let durable = self.store.state().await?;
        if !force && durable.is_applied(target) {
            debug!("{} already bound to {:?}", self.app.bundle_id, target);
            return Ok(Rebind::Unchanged);
        }

        let mut was_running = false;
        if self.store.restart_gracefully().await? {
            was_running = self
                .graceful
                .request_graceful_quit(&self.app)
                .await?
                .was_running;
        }

        let confirmed = self
            .reaper
            .kill_and_confirm(&self.app, None)
            .await?
            .confirmed()
            .await?;
        was_running |= confirmed.was_running;

        let staged = self.store.stage_target(target).await;
        self.commit_or_roll_back(staged, &durable, CommitStage::Target)
            .await?;
        info!("Committed target interface {:?}", target);

        let pid = if was_running {
            let pid = self.control.launch(&self.app).await.map_err(|source| {
                Error::RestartFailed {
                    bundle_id: self.app.bundle_id.clone(),
                    source,
                }
            })?;
            info!("Relaunched {} as pid {}", self.app.bundle_id, pid);
            Some(pid)
        } else {
            debug!(
                "{} was not running, it will read the binding at its next start",
                self.app.bundle_id
            );
            None
        };

        let committed = BindingState {
            target_interface_name: target.map(str::to_string),
            last_applied_name: durable.last_applied_name,
        };
        let staged = self.store.stage_last_applied(target).await;
        self.commit_or_roll_back(staged, &committed, CommitStage::Applied)
            .await?;

        Ok(Rebind::Applied {
            relaunched: pid.is_some(),
            pid,
        })
    }

    async fn commit_staged(&self, staged: binding_store::Result<()>) -> binding_store::Result<()> {
        staged?;
        self.store.commit().await
    }

    /// Commit what was just staged, or put `durable` back in the staging area
    async fn commit_or_roll_back(
        &self,
        staged: binding_store::Result<()>,
        durable: &BindingState,
        stage: CommitStage,
    ) -> Result<()> {
        let Err(source) = self.commit_staged(staged).await else {
            return Ok(());
        };

        warn!("Commit of {} failed, rolling back staged binding", stage);
        if let Err(e) = self.store.restore(durable).await {
            warn!("Failed to roll back staged binding: {}", e);
        }
        Err(Error::StoreCommitFailed { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[smol_potat::test]
    async fn test_list_interfaces_excludes_loopback() {
        let harness = Harness::new();
        let interfaces = harness.binder.list_interfaces().await.unwrap();
        assert!(!interfaces.is_empty());
        assert!(interfaces.iter().all(|i| !i.is_loopback()));
        assert!(interfaces.iter().all(|i| i.name != "lo0"));
    }

    #[smol_potat::test]
    async fn test_current_binding_unbound() {
        let harness = Harness::new();
        assert_eq!(harness.binder.current_binding().await.unwrap(), None);
        assert_eq!(harness.binder.target_interface_name().await.unwrap(), None);
    }

    #[smol_potat::test]
    async fn test_current_binding_prefers_ipv4() {
        let harness = Harness::new();
        harness.binder.bind_to_interface_named("en1").await.unwrap();

        let bound = harness.binder.current_binding().await.unwrap().unwrap();
        assert_eq!(bound.name, "en1");
        assert_eq!(bound.address, "10.0.0.5");
    }

    #[smol_potat::test]
    async fn test_current_binding_reports_vanished_interface() {
        let harness = Harness::new();
        harness.binder.bind_to_interface_named("utun3").await.unwrap();

        harness.host.set_interfaces(
            crate::testing::default_interfaces()
                .into_iter()
                .filter(|i| i.name != "utun3")
                .collect(),
        );

        let err = harness.binder.current_binding().await.unwrap_err();
        assert!(matches!(err, Error::InterfaceUnavailable(name) if name == "utun3"));
    }

    #[smol_potat::test]
    async fn test_bind_unknown_name() {
        let harness = Harness::new();
        let err = harness.binder.bind_to_interface_named("wg9").await.unwrap_err();
        assert!(matches!(err, Error::InterfaceNotFound(name) if name == "wg9"));
        assert!(harness.journal().steps().is_empty());
    }

    #[smol_potat::test]
    async fn test_bind_while_stopped_does_not_launch() {
        let harness = Harness::new();
        let outcome = harness.binder.bind_to_interface_named("en0").await.unwrap();

        assert_eq!(
            outcome,
            Rebind::Applied {
                relaunched: false,
                pid: None
            }
        );
        assert!(harness.journal().launches().is_empty());
        assert_eq!(harness.store.committed_target().as_deref(), Some("en0"));
        assert_eq!(harness.store.committed_last_applied().as_deref(), Some("en0"));
    }

    #[smol_potat::test]
    async fn test_set_restart_gracefully_commits() {
        let harness = Harness::new();
        assert!(harness.binder.restart_gracefully().await.unwrap());

        harness.binder.set_restart_gracefully(false).await.unwrap();
        assert!(!harness.binder.restart_gracefully().await.unwrap());
        assert_eq!(
            harness
                .store
                .committed(binding_store::keys::RESTART_GRACEFULLY)
                .as_deref(),
            Some("false")
        );
    }

    #[smol_potat::test]
    async fn test_set_restart_gracefully_commit_failure() {
        let harness = Harness::new();
        harness.store.set_fail_commits(true);
        let err = harness.binder.set_restart_gracefully(false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::StoreCommitFailed {
                stage: CommitStage::Setting,
                ..
            }
        ));
        assert!(harness.binder.restart_gracefully().await.unwrap());

        harness.store.set_fail_commits(false);
        harness.binder.bind_to_interface_named("en0").await.unwrap();
        assert_eq!(
            harness
                .store
                .committed(binding_store::keys::RESTART_GRACEFULLY)
                .as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_rebind_serialization() {
        let json = serde_json::to_value(Rebind::Applied {
            relaunched: true,
            pid: Some(42),
        })
        .unwrap();
        assert_eq!(json["outcome"], "applied");
        assert_eq!(json["pid"], 42);

        let json = serde_json::to_value(Rebind::Unchanged).unwrap();
        assert_eq!(json["outcome"], "unchanged");
    }
}
