use std::collections::HashMap;
use std::sync::Arc;

use aiza_domain::Result;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::{KeyValueStorage, StorageChange};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-memory storage. Clones share entries and the change feed, so two
/// clones behave like two tabs on the same origin.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { entries: Arc::new(RwLock::new(HashMap::new())), changes }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine.
        let _ = self.changes.send(StorageChange { key: key.to_string(), new_value });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.entries.write().remove(key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
