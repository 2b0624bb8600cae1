//! Key-value storage port
//!
//! Models per-origin local storage: string keys, string values, synchronous
//! reads and writes, and a change feed other sessions can watch.

mod memory;

pub use memory::MemoryStorage;

use aiza_domain::Result;
use tokio::sync::broadcast;

/// A write observed on the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Trait for the persisted key-value backend
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key` as a whole.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Feed of writes made through any handle sharing this storage.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}
