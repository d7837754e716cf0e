//! Sled database backend for the binding store

use super::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Sled-based key-value backend
///
/// Writes land in sled's page cache immediately. `commit` forces them to
/// disk, but unlike [`FileStore`](super::file::FileStore) and
/// [`MemoryStore`](super::memory::MemoryStore) it is not the only point where
/// they become durable: sled's background flush and the flush on drop persist
/// whatever is staged at that moment. Callers that abandon a change must
/// re-stage the previous value rather than rely on never committing.
pub struct SledStore {
    /// Database instance
    db: sled::Db,
    /// Preferences tree
    preferences: sled::Tree,
    /// Where the database lives, for error reporting
    path: PathBuf,
}

impl SledStore {
    /// Open (or create) a sled store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        info!("Opening sled database at {:?}", path);

        let db = sled::open(path)?;
        let preferences = db.open_tree("preferences")?;

        Ok(Self {
            db,
            preferences,
            path: path.to_path_buf(),
        })
    }

    /// Create an in-memory sled store (for testing)
    pub async fn in_memory() -> Result<Self> {
        info!("Creating in-memory sled database");

        let db = sled::Config::new().temporary(true).open()?;
        let preferences = db.open_tree("preferences")?;

        Ok(Self {
            db,
            preferences,
            path: PathBuf::from(":memory:"),
        })
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!("Getting preference: {}", key);

        match self.preferences.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| Error::Corrupt {
                    path: self.path.clone(),
                    reason: format!("value of {} is not UTF-8: {}", key, e),
                }),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("Staging preference: {} = {}", key, value);
        self.preferences.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!("Staging removal of preference: {}", key);
        self.preferences.remove(key.as_bytes())?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let bytes = self.db.flush_async().await?;
        debug!("Flushed {} bytes to {:?}", bytes, self.path);
        Ok(())
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        // Attempt to flush on drop
        if let Err(e) = self.db.flush() {
            error!("Failed to flush database on drop: {}", e);
        }
    }
}
