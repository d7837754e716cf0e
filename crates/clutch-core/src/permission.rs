//! Permission gate for privileged supervisor operations

use async_trait::async_trait;
use host_control::{AppSpec, ProcessControl};
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether the supervisor may observe and kill the supervised application
///
/// Grants can be revoked at any time, so implementations must query the OS
/// on every call and callers must not keep the answer.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Query the current grant
    async fn has_permissions(&self) -> bool;
}

/// Sends the null signal to every live instance
///
/// With no live instance there is nothing to signal and starting the
/// application needs no privilege, so the gate is open. Check failures
/// close the gate.
pub struct SignalPermission {
    control: Arc<dyn ProcessControl>,
    app: AppSpec,
}

impl SignalPermission {
    /// Create a gate for `app`
    pub fn new(control: Arc<dyn ProcessControl>, app: AppSpec) -> Self {
        Self { control, app }
    }
}

#[async_trait]
impl PermissionGate for SignalPermission {
    async fn has_permissions(&self) -> bool {
        let process = match self.control.lookup(&self.app).await {
            Ok(process) => process,
            Err(e) => {
                warn!("Permission check for {} failed: {}", self.app.bundle_id, e);
                return false;
            }
        };

        let Some(pid) = process.pid else {
            debug!("{} is not running, nothing to signal", self.app.bundle_id);
            return true;
        };

        match self.control.can_signal(pid).await {
            Ok(granted) => {
                debug!(pid, granted, "signal permission check");
                granted
            }
            Err(e) => {
                warn!("Permission check for pid {} failed: {}", pid, e);
                false
            }
        }
    }
}

/// A gate with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn has_permissions(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[test]
    fn test_signal_permission_follows_null_signal() {
        smol::block_on(async {
            let host = FakeHost::new();
            let app = crate::testing::test_app();
            let gate = SignalPermission::new(Arc::new(host.clone()), app.clone());

            assert!(gate.has_permissions().await, "nothing running");

            host.spawn(&app);
            assert!(gate.has_permissions().await);

            host.set_signal_permitted(false);
            assert!(!gate.has_permissions().await);

            host.set_signal_permitted(true);
            assert!(gate.has_permissions().await, "grant is re-read each call");
        });
    }

    #[test]
    fn test_static_permission() {
        smol::block_on(async {
            assert!(StaticPermission(true).has_permissions().await);
            assert!(!StaticPermission(false).has_permissions().await);
        });
    }
}
