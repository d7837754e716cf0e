//! In-memory backend for the binding store

use super::KeyValueStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory key-value backend
///
/// Staged and committed values are kept apart so tests can tell what a
/// freshly started reader would see.
#[derive(Default)]
pub struct MemoryStore {
    staged: RwLock<BTreeMap<String, String>>,
    committed: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Value as a newly started reader would see it
    pub fn committed(&self, key: &str) -> Option<String> {
        read(&self.committed).get(key).cloned()
    }

    /// Whether there are changes that have not been committed
    pub fn has_staged_changes(&self) -> bool {
        *read(&self.staged) != *read(&self.committed)
    }
}

fn read(lock: &RwLock<BTreeMap<String, String>>) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(
    lock: &RwLock<BTreeMap<String, String>>,
) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(read(&self.staged).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        write(&self.staged).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        write(&self.staged).remove(key);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let snapshot = read(&self.staged).clone();
        *write(&self.committed) = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_values_are_not_committed() {
        smol::block_on(async {
            let store = MemoryStore::new();
            store.set("target-interface-name", "en1").await.unwrap();

            assert_eq!(
                store.get("target-interface-name").await.unwrap().as_deref(),
                Some("en1")
            );
            assert_eq!(store.committed("target-interface-name"), None);
            assert!(store.has_staged_changes());

            store.commit().await.unwrap();
            assert_eq!(
                store.committed("target-interface-name").as_deref(),
                Some("en1")
            );
            assert!(!store.has_staged_changes());
        });
    }

    #[test]
    fn test_remove_is_staged() {
        smol::block_on(async {
            let store = MemoryStore::new();
            store.set("target-interface-name", "en1").await.unwrap();
            store.commit().await.unwrap();

            store.remove("target-interface-name").await.unwrap();
            assert_eq!(store.get("target-interface-name").await.unwrap(), None);
            assert!(store.committed("target-interface-name").is_some());

            store.commit().await.unwrap();
            assert!(store.committed("target-interface-name").is_none());
        });
    }
}
