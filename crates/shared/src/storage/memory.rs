//! In-process storage shared between contexts.
//!
//! Each [`MemoryStorage`] handle is one context over a shared map, the way
//! browser tabs of one origin share local storage. Used by tests and by
//! callers that do not need persistence across restarts.

use super::{change_channel, next_context_id, ChangeFeed, Envelope, KeyValueStorage, StorageError, StorageEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

struct Shared {
    values: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<Envelope>,
}

/// One context onto an in-memory key/value map
pub struct MemoryStorage {
    shared: Arc<Shared>,
    context: u64,
}

impl MemoryStorage {
    /// Create an empty storage with a single context
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                values: Mutex::new(HashMap::new()),
                events: change_channel(),
            }),
            context: next_context_id(),
        }
    }

    /// Open another context over the same data
    ///
    /// Writes made through one context are announced to every other one.
    pub fn new_context(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            context: next_context_id(),
        }
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.shared.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, event: StorageEvent) {
        // No subscribers is fine
        let _ = self.shared.events.send(Envelope {
            origin: self.context,
            event,
        });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value.to_string());
        self.announce(StorageEvent::changed(key));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let removed = self.values().remove(key).is_some();
        if removed {
            self.announce(StorageEvent::changed(key));
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.values().clear();
        self.announce(StorageEvent::everything());
        Ok(())
    }

    fn watch(&self) -> ChangeFeed {
        ChangeFeed::new(self.shared.events.subscribe(), self.context)
    }
}
