//! Wiring against the real host

use crate::binder::{Collaborators, InterfaceBinder};
use crate::catalog::SystemCatalog;
use crate::config::{ClutchConfig, StoreBackend};
use crate::permission::SignalPermission;
use crate::Result;
use binding_store::{FileStore, KeyValueStore, SledStore};
use host_control::{
    CommandQuitChannel, LocalProcessControl, ProcessControl, QuitChannel, SignalQuitChannel,
};
use std::sync::Arc;
use tracing::info;

/// Build a binder for the application named in `config`
pub async fn connect(config: &ClutchConfig) -> Result<InterfaceBinder> {
    config.validate()?;

    let path = config.store.resolved_path()?;
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }
    let store: Arc<dyn KeyValueStore> = match config.store.backend {
        StoreBackend::File => Arc::new(FileStore::open(&path).await?),
        StoreBackend::Sled => Arc::new(SledStore::open(&path).await?),
    };
    info!("Using {:?} binding store at {:?}", config.store.backend, path);

    let control: Arc<dyn ProcessControl> = Arc::new(LocalProcessControl::new());
    let quit: Arc<dyn QuitChannel> = match config.quit.command() {
        Some(command) => Arc::new(CommandQuitChannel::new(command)),
        None => Arc::new(SignalQuitChannel::new(control.clone())),
    };
    let permissions = Arc::new(SignalPermission::new(control.clone(), config.app.clone()));

    Ok(InterfaceBinder::new(
        config.app.clone(),
        Collaborators {
            control,
            catalog: Arc::new(SystemCatalog),
            permissions,
            quit,
            store,
        },
        config.timeouts.to_timeouts(),
    ))
}
