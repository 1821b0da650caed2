//! SQLite-backed storage shared between processes.
//!
//! Every process opens its own connection to the same database file. Writes
//! made by other connections are discovered by polling: `PRAGMA data_version`
//! tells whether anything was committed elsewhere, and per-key revisions tell
//! which keys changed.

use super::{change_channel, next_context_id, ChangeFeed, Envelope, KeyValueStorage, StorageError, StorageEvent, EXTERNAL_ORIGIN};
use crate::db::Database;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Revisions this context has already accounted for
struct Snapshot {
    data_version: i64,
    revisions: HashMap<String, i64>,
}

/// One process's context onto a shared SQLite key/value store
pub struct SqliteStorage {
    db: Mutex<Database>,
    snapshot: Mutex<Snapshot>,
    events: broadcast::Sender<Envelope>,
    context: u64,
}

impl SqliteStorage {
    /// Open (or create) the storage database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::open(path)?;
        let snapshot = Snapshot {
            data_version: db.data_version()?,
            revisions: db.revisions()?,
        };

        Ok(Self {
            db: Mutex::new(db),
            snapshot: Mutex::new(snapshot),
            events: change_channel(),
            context: next_context_id(),
        })
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look for writes committed by other connections
    ///
    /// Emits one change event per key whose revision differs from what this
    /// context last saw (including removed keys) and returns how many were
    /// emitted.
    pub fn poll_changes(&self) -> Result<usize, StorageError> {
        let db = self.db();
        let mut snapshot = self.snapshot();

        let data_version = db.data_version()?;
        if data_version == snapshot.data_version {
            return Ok(0);
        }

        let revisions = db.revisions()?;
        let mut changed: Vec<String> = revisions
            .iter()
            .filter(|(key, revision)| snapshot.revisions.get(*key) != Some(revision))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(
            snapshot
                .revisions
                .keys()
                .filter(|key| !revisions.contains_key(*key))
                .cloned(),
        );

        snapshot.data_version = data_version;
        snapshot.revisions = revisions;
        drop(snapshot);
        drop(db);

        for key in &changed {
            debug!(key = %key, "Detected external storage change");
            let _ = self.events.send(Envelope {
                origin: EXTERNAL_ORIGIN,
                event: StorageEvent::changed(key.as_str()),
            });
        }

        Ok(changed.len())
    }

    /// Poll for external writes every `interval` on the current runtime
    ///
    /// The task ends on its own once the storage is dropped; abort the
    /// returned handle to stop it earlier.
    pub fn start_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let storage: Weak<Self> = Arc::downgrade(self);
        info!(interval_ms = interval.as_millis() as u64, "Starting storage watcher");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(live) = storage.upgrade() else {
                    debug!("Storage dropped, stopping watcher");
                    break;
                };
                if let Err(e) = live.poll_changes() {
                    warn!(error = %e, "Failed to poll storage for changes");
                }
            }
        })
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.db().get_value(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut db = self.db();
        let revision = db.put_value(key, value)?;
        self.snapshot().revisions.insert(key.to_string(), revision);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let db = self.db();
        db.delete_value(key)?;
        self.snapshot().revisions.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let db = self.db();
        db.delete_all()?;
        self.snapshot().revisions.clear();
        Ok(())
    }

    fn watch(&self) -> ChangeFeed {
        ChangeFeed::new(self.events.subscribe(), self.context)
    }
}
