//! Durable key/value storage with cross-context change notifications.
//!
//! Storage is modeled on browser local storage: string values under string
//! keys, shared by several contexts (processes, connections, or in-process
//! handles). Each context can [`watch`](KeyValueStorage::watch) for changes
//! made by the *other* contexts; its own writes are never echoed back.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Capacity of each storage change channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Origin used for changes detected outside any in-process context
const EXTERNAL_ORIGIN: u64 = 0;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Errors raised by storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A change made by another context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed, or `None` when the whole storage changed
    /// (cleared, or notifications were missed)
    pub key: Option<String>,
}

impl StorageEvent {
    pub fn changed(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    pub fn everything() -> Self {
        Self { key: None }
    }

    /// Whether a reader of `key` has to reload after this event
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |changed| changed == key)
    }
}

/// Event as it travels on the channel, tagged with the writing context
#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    event: StorageEvent,
}

fn next_context_id() -> u64 {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

fn change_channel() -> broadcast::Sender<Envelope> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

/// Stream of changes made by other contexts
pub struct ChangeFeed {
    receiver: broadcast::Receiver<Envelope>,
    context: u64,
}

impl ChangeFeed {
    fn new(receiver: broadcast::Receiver<Envelope>, context: u64) -> Self {
        Self { receiver, context }
    }

    /// Wait for the next change made by another context
    ///
    /// Returns `None` once the storage has been dropped. If this feed fell
    /// behind and notifications were lost, a whole-storage event is returned
    /// so the reader resynchronizes.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.context => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Storage change feed lagged, forcing resync");
                    return Some(StorageEvent::everything());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Browser-style key/value storage
pub trait KeyValueStorage: Send + Sync {
    /// Read the value under `key`
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, notifying other contexts
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key` if present, notifying other contexts
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key, notifying other contexts
    fn clear(&self) -> Result<(), StorageError>;

    /// Subscribe to changes made by other contexts
    fn watch(&self) -> ChangeFeed;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_affects() {
        assert!(StorageEvent::changed("wishlist").affects("wishlist"));
        assert!(!StorageEvent::changed("theme").affects("wishlist"));
        assert!(StorageEvent::everything().affects("wishlist"));
    }

    #[tokio::test]
    async fn test_feed_skips_own_events() {
        let sender = change_channel();
        let mut feed = ChangeFeed::new(sender.subscribe(), 7);

        sender
            .send(Envelope {
                origin: 7,
                event: StorageEvent::changed("own"),
            })
            .unwrap();
        sender
            .send(Envelope {
                origin: 8,
                event: StorageEvent::changed("other"),
            })
            .unwrap();

        assert_eq!(feed.recv().await, Some(StorageEvent::changed("other")));

        drop(sender);
        assert_eq!(feed.recv().await, None);
    }

    #[tokio::test]
    async fn test_feed_lag_forces_resync() {
        let sender = change_channel();
        let mut feed = ChangeFeed::new(sender.subscribe(), 1);

        for i in 0..(CHANGE_CHANNEL_CAPACITY + 5) {
            sender
                .send(Envelope {
                    origin: 2,
                    event: StorageEvent::changed(format!("k{}", i)),
                })
                .unwrap();
        }

        assert_eq!(feed.recv().await, Some(StorageEvent::everything()));
    }
}
