//! JSON file backend for the binding store
//!
//! The supervised application reads this file once at startup, so a commit
//! must replace it atomically: readers see either the previous document or
//! the new one, never a partial write.
//!
//! ```json
//! {
//!   "last-applied-interface-name": "en1",
//!   "restart-gracefully": "true",
//!   "target-interface-name": "en1"
//! }
//! ```

use super::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_lite::io::AsyncWriteExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// File-backed key-value store
pub struct FileStore {
    path: PathBuf,
    staged: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading any committed document
    ///
    /// A missing file is an empty store; it is created on first commit.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let staged = match async_fs::read_to_string(&path).await {
            Ok(contents) => {
                info!("Loading binding store from {:?}", path);
                serde_json::from_str(&contents).map_err(|e| Error::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No binding store at {:?}, starting empty", path);
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            staged: Mutex::new(staged),
        })
    }

    /// Location of the committed document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staged(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.staged().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("Staging preference: {} = {}", key, value);
        self.staged().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!("Staging removal of preference: {}", key);
        self.staged().remove(key);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let document = serde_json::to_vec_pretty(&*self.staged())?;

        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf);
        if let Some(parent) = &parent {
            async_fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        {
            let mut file = async_fs::File::create(&temp).await?;
            file.write_all(&document).await?;
            file.sync_all().await?;
        }
        async_fs::rename(&temp, &self.path).await?;

        // Persist the rename itself.
        #[cfg(unix)]
        {
            if let Some(parent) = &parent {
                async_fs::File::open(parent).await?.sync_all().await?;
            }
        }

        debug!("Committed {} bytes to {:?}", document.len(), self.path);
        Ok(())
    }
}
