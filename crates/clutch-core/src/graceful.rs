//! Graceful quit controller

use crate::permission::PermissionGate;
use crate::reaper::{ConfirmedTermination, Reaper, TerminationStrategy};
use crate::{Error, Result};
use host_control::{AppSpec, QuitChannel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Asks the application to quit before anything is killed
#[derive(Clone)]
pub struct GracefulQuit {
    reaper: Reaper,
    permissions: Arc<dyn PermissionGate>,
    channel: Arc<dyn QuitChannel>,
    grace: Duration,
}

impl GracefulQuit {
    /// Create a controller that escalates to forced kills after `grace`
    pub fn new(
        reaper: Reaper,
        permissions: Arc<dyn PermissionGate>,
        channel: Arc<dyn QuitChannel>,
        grace: Duration,
    ) -> Self {
        Self {
            reaper,
            permissions,
            channel,
            grace,
        }
    }

    /// Whether a cooperative quit may be requested right now
    pub async fn has_permissions(&self) -> bool {
        self.permissions.has_permissions().await
    }

    /// Ask `app` to quit and wait until the OS reports it gone
    ///
    /// The permission grant is checked again here, not trusted from an
    /// earlier answer. Nothing is signalled when the grant is missing.
    pub async fn request_graceful_quit(&self, app: &AppSpec) -> Result<ConfirmedTermination> {
        if !self.has_permissions().await {
            warn!("Not permitted to quit {}", app.bundle_id);
            return Err(Error::PermissionDenied {
                bundle_id: app.bundle_id.clone(),
            });
        }

        info!("Requesting graceful quit of {}", app.bundle_id);
        let strategy = TerminationStrategy::Cooperative {
            channel: self.channel.clone(),
            grace: self.grace,
        };
        self.reaper
            .kill_and_confirm(app, Some(strategy))
            .await?
            .confirmed()
            .await
    }
}
