//! Durable storage for the interface binding preference
//!
//! The supervised application reads its binding only at startup, so every
//! change goes through an explicit [`KeyValueStore::commit`] before the
//! application is relaunched.

#![warn(missing_docs)]

pub mod backend;
pub mod binding;
pub mod error;

pub use backend::file::FileStore;
pub use backend::memory::MemoryStore;
pub use backend::sled::SledStore;
pub use backend::KeyValueStore;
pub use binding::{keys, BindingState, BindingStore};
pub use error::{Error, Result};
