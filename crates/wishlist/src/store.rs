//! Wishlist store: in-memory collection persisted under one storage key.
//!
//! The collection is the source of truth while the process runs; every change
//! is written to storage as a JSON array and announced to listeners. What is
//! found in storage at load time is trusted only after validation: unreadable
//! payloads load as an empty wishlist, malformed entries are skipped and
//! duplicate `(id, kind)` pairs are collapsed.

use crate::observer::{Outbox, Registry, Subscription};
use serde_json::Value;
use shared::{CatalogEntry, KeyValueStorage, MediaKind, WishlistCounts, WishlistItem};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Storage key the wishlist is kept under
pub const DEFAULT_STORAGE_KEY: &str = "anime-manga-wishlist";

pub(crate) struct Inner {
    pub(crate) storage: Arc<dyn KeyValueStorage>,
    pub(crate) key: String,
    items: Mutex<Vec<WishlistItem>>,
    listeners: Registry<[WishlistItem]>,
    /// Snapshots queued under the items lock, in change order
    outbox: Outbox<[WishlistItem], Vec<WishlistItem>>,
}

/// Observable wishlist backed by durable storage
///
/// Clones share the same collection and listeners.
#[derive(Clone)]
pub struct WishlistStore {
    pub(crate) inner: Arc<Inner>,
}

impl WishlistStore {
    /// Open the wishlist stored under [`DEFAULT_STORAGE_KEY`]
    pub fn open(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_key(storage, DEFAULT_STORAGE_KEY)
    }

    /// Open the wishlist stored under `key`
    pub fn with_key(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let items = load_items(storage.as_ref(), &key);
        info!(key = %key, count = items.len(), "Loaded wishlist");

        Self {
            inner: Arc::new(Inner {
                storage,
                key,
                items: Mutex::new(items),
                listeners: Registry::new(),
                outbox: Outbox::new(),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    fn items_guard(&self) -> MutexGuard<'_, Vec<WishlistItem>> {
        self.inner.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the current items for every listener; call with the items lock
    /// held so notifications follow the order of changes
    fn announce(&self, items: &[WishlistItem]) {
        self.inner
            .outbox
            .push(self.inner.listeners.targets(), items.to_vec());
    }

    /// Deliver queued notifications; call after releasing the items lock
    fn flush(&self) {
        self.inner.outbox.flush(&self.inner.listeners);
    }

    /// Save `entry` unless an item with the same id and kind is already saved
    ///
    /// Returns whether the wishlist changed.
    pub fn add(&self, entry: &impl CatalogEntry, kind: MediaKind) -> bool {
        let item = WishlistItem::from_entry(entry, kind);

        {
            let mut items = self.items_guard();
            if items.iter().any(|existing| existing.matches(item.id, kind)) {
                debug!(id = item.id, kind = %kind, "Already in wishlist");
                return false;
            }

            info!(id = item.id, kind = %kind, title = %item.title, "Adding to wishlist");
            items.push(item);
            self.persist(&items);
            self.announce(&items);
        }

        self.flush();
        true
    }

    /// Remove the item with this id and kind, if saved
    ///
    /// Returns whether the wishlist changed.
    pub fn remove(&self, id: u32, kind: MediaKind) -> bool {
        {
            let mut items = self.items_guard();
            let before = items.len();
            items.retain(|item| !item.matches(id, kind));
            if items.len() == before {
                return false;
            }

            info!(id = id, kind = %kind, "Removed from wishlist");
            self.persist(&items);
            self.announce(&items);
        }

        self.flush();
        true
    }

    pub fn contains(&self, id: u32, kind: MediaKind) -> bool {
        self.items_guard().iter().any(|item| item.matches(id, kind))
    }

    /// Copy of every saved item, oldest first
    pub fn items(&self) -> Vec<WishlistItem> {
        self.items_guard().clone()
    }

    pub fn items_of_kind(&self, kind: MediaKind) -> Vec<WishlistItem> {
        self.items_guard()
            .iter()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> WishlistCounts {
        let items = self.items_guard();
        let anime = items.iter().filter(|item| item.kind == MediaKind::Anime).count();

        WishlistCounts {
            total: items.len(),
            anime,
            manga: items.len() - anime,
        }
    }

    pub fn len(&self) -> usize {
        self.items_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items_guard().is_empty()
    }

    /// Register `callback`, call it once right away with the current items,
    /// and then after every change
    ///
    /// Subscribing from inside another listener defers the first call until
    /// that listener returns.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[WishlistItem]) + Send + Sync + 'static,
    {
        let subscription = {
            let items = self.items_guard();
            let subscription = self.inner.listeners.register(callback);

            // The first call goes through the queue too, so it can't
            // arrive after a later change
            let target = self
                .inner
                .listeners
                .targets()
                .into_iter()
                .filter(|(id, _)| *id == subscription.id())
                .collect();
            self.inner.outbox.push(target, items.clone());
            subscription
        };

        self.flush();
        subscription
    }

    /// Replace the in-memory items with what storage holds now and notify
    pub fn reload(&self) {
        {
            // Read under the lock so a concurrent add or remove is either
            // already in storage or applied after this load
            let mut items = self.items_guard();
            let loaded = load_items(self.inner.storage.as_ref(), &self.inner.key);
            debug!(key = %self.inner.key, before = items.len(), after = loaded.len(), "Reloaded wishlist");
            *items = loaded;
            self.announce(&items);
        }

        self.flush();
    }

    /// Write the whole collection; failures leave memory authoritative
    fn persist(&self, items: &[WishlistItem]) {
        let payload = match serde_json::to_string(items) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize wishlist");
                return;
            }
        };

        if let Err(e) = self.inner.storage.set_item(&self.inner.key, &payload) {
            warn!(key = %self.inner.key, error = %e, "Failed to save wishlist");
        }
    }
}

/// Read and validate the items stored under `key`
fn load_items(storage: &dyn KeyValueStorage, key: &str) -> Vec<WishlistItem> {
    match storage.get_item(key) {
        Ok(Some(raw)) => parse_items(&raw),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read wishlist, starting empty");
            Vec::new()
        }
    }
}

fn parse_items(raw: &str) -> Vec<WishlistItem> {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!("Stored wishlist is not a JSON array, ignoring it");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Stored wishlist is not valid JSON, ignoring it");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        match serde_json::from_value::<WishlistItem>(entry) {
            // First occurrence of an (id, kind) pair wins
            Ok(item) if seen.insert((item.id, item.kind)) => items.push(item),
            Ok(item) => debug!(id = item.id, kind = %item.kind, "Dropping duplicate wishlist entry"),
            Err(e) => warn!(error = %e, "Skipping malformed wishlist entry"),
        }
    }

    items
}
