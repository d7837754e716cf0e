//! Typed view of the binding preference
//!
//! The supervised application reads these keys at its own startup:
//!
//! | key | meaning |
//! |---|---|
//! | `target-interface-name` | interface to bind to; absent means unrestricted |
//! | `last-applied-interface-name` | interface the running instance was started with |
//! | `restart-gracefully` | `"true"`/`"false"`, quit cooperatively before restarting |

use crate::backend::KeyValueStore;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Well-known keys
pub mod keys {
    /// Interface the application must bind to at startup
    pub const TARGET_INTERFACE: &str = "target-interface-name";
    /// Interface the current application instance was started with
    pub const LAST_APPLIED_INTERFACE: &str = "last-applied-interface-name";
    /// Whether restarts ask the application to quit cooperatively first
    pub const RESTART_GRACEFULLY: &str = "restart-gracefully";
}

/// Persisted binding state
///
/// `None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindingState {
    /// Interface the application should be bound to
    pub target_interface_name: Option<String>,
    /// Interface the application was last (re)started with
    pub last_applied_name: Option<String>,
}

impl BindingState {
    /// Whether `target` is both committed and applied
    pub fn is_applied(&self, target: Option<&str>) -> bool {
        self.target_interface_name.as_deref() == target
            && self.last_applied_name.as_deref() == target
    }
}

/// Binding preference store shared with the supervised application
#[derive(Clone)]
pub struct BindingStore {
    backend: Arc<dyn KeyValueStore>,
}

impl BindingStore {
    /// Wrap a key-value backend
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Read the current state, including staged changes
    pub async fn state(&self) -> Result<BindingState> {
        Ok(BindingState {
            target_interface_name: self.name(keys::TARGET_INTERFACE).await?,
            last_applied_name: self.name(keys::LAST_APPLIED_INTERFACE).await?,
        })
    }

    /// Stage a new target; `None` clears the binding
    pub async fn stage_target(&self, name: Option<&str>) -> Result<()> {
        self.set_name(keys::TARGET_INTERFACE, name).await
    }

    /// Stage the interface the application was started with
    pub async fn stage_last_applied(&self, name: Option<&str>) -> Result<()> {
        self.set_name(keys::LAST_APPLIED_INTERFACE, name).await
    }

    /// Re-stage `state`, discarding any staged target or applied interface
    ///
    /// Used after a failed commit so that later reads, and later commits of
    /// unrelated keys, see the last durable state instead.
    pub async fn restore(&self, state: &BindingState) -> Result<()> {
        self.stage_target(state.target_interface_name.as_deref())
            .await?;
        self.stage_last_applied(state.last_applied_name.as_deref())
            .await
    }

    /// Whether restarts should quit cooperatively first (default `true`)
    pub async fn restart_gracefully(&self) -> Result<bool> {
        Ok(match self.backend.get(keys::RESTART_GRACEFULLY).await?.as_deref() {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => {
                warn!(
                    "Ignoring unrecognised {} value {:?}",
                    keys::RESTART_GRACEFULLY,
                    other
                );
                true
            }
        })
    }

    /// Stage the graceful restart flag
    pub async fn stage_restart_gracefully(&self, gracefully: bool) -> Result<()> {
        let value = if gracefully { "true" } else { "false" };
        self.backend.set(keys::RESTART_GRACEFULLY, value).await
    }

    /// Make staged changes durable
    pub async fn commit(&self) -> Result<()> {
        self.backend.commit().await
    }

    async fn name(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .backend
            .get(key)
            .await?
            .filter(|value| !value.is_empty()))
    }

    async fn set_name(&self, key: &str, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) if !name.is_empty() => self.backend.set(key, name).await,
            _ => self.backend.remove(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;

    fn store() -> (Arc<MemoryStore>, BindingStore) {
        let backend = Arc::new(MemoryStore::new());
        (backend.clone(), BindingStore::new(backend))
    }

    #[smol_potat::test]
    async fn test_default_state_is_unbound() {
        let (_, store) = store();
        let state = store.state().await.unwrap();
        assert_eq!(state, BindingState::default());
        assert!(state.is_applied(None));
        assert!(store.restart_gracefully().await.unwrap());
    }

    #[smol_potat::test]
    async fn test_stage_and_commit_target() {
        let (backend, store) = store();
        store.stage_target(Some("en1")).await.unwrap();

        let state = store.state().await.unwrap();
        assert_eq!(state.target_interface_name.as_deref(), Some("en1"));
        assert!(!state.is_applied(Some("en1")));
        assert_eq!(backend.committed(keys::TARGET_INTERFACE), None);

        store.commit().await.unwrap();
        assert_eq!(
            backend.committed(keys::TARGET_INTERFACE).as_deref(),
            Some("en1")
        );
    }

    #[smol_potat::test]
    async fn test_clearing_target_removes_key() {
        let (backend, store) = store();
        store.stage_target(Some("en1")).await.unwrap();
        store.commit().await.unwrap();

        store.stage_target(None).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(backend.committed(keys::TARGET_INTERFACE), None);
        assert_eq!(store.state().await.unwrap().target_interface_name, None);
    }

    #[smol_potat::test]
    async fn test_restore_discards_staged_values() {
        let (backend, store) = store();
        store.stage_target(Some("en0")).await.unwrap();
        store.stage_last_applied(Some("en0")).await.unwrap();
        store.commit().await.unwrap();
        let durable = store.state().await.unwrap();

        store.stage_target(Some("utun3")).await.unwrap();
        store.restore(&durable).await.unwrap();
        assert_eq!(store.state().await.unwrap(), durable);
        assert!(!backend.has_staged_changes());

        store.restore(&BindingState::default()).await.unwrap();
        assert_eq!(store.state().await.unwrap(), BindingState::default());
    }

    #[smol_potat::test]
    async fn test_restart_gracefully_flag() {
        let (backend, store) = store();
        store.stage_restart_gracefully(false).await.unwrap();
        assert!(!store.restart_gracefully().await.unwrap());

        backend
            .set(keys::RESTART_GRACEFULLY, "sometimes")
            .await
            .unwrap();
        assert!(store.restart_gracefully().await.unwrap());
    }
}
