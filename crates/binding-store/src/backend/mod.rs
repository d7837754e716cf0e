//! Key-value backend implementations

pub mod file;
pub mod memory;
pub mod sled;

use crate::error::Result;
use async_trait::async_trait;

/// A key-value store with explicit durability
///
/// `set` and `remove` stage a change that the process itself reads back
/// immediately. Other readers, in particular the supervised application at
/// its own startup, are only guaranteed to see it after `commit` returns.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, including staged changes
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stage a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Stage the removal of a key
    async fn remove(&self, key: &str) -> Result<()>;

    /// Make every staged change durable
    async fn commit(&self) -> Result<()>;
}
