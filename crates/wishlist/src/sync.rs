//! Following wishlist writes made by other contexts.

use crate::store::WishlistStore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Running sync task; stopped by [`shutdown`](Self::shutdown) or on drop
#[derive(Debug)]
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn shutdown(self) {
        self.task.abort();
        debug!("Wishlist sync stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl WishlistStore {
    /// Reload whenever another context changes the wishlist key
    ///
    /// The task first yields once and reloads unconditionally, which picks up
    /// anything written between opening the store and starting the sync.
    /// Must be called from within a tokio runtime.
    pub fn start_sync(&self) -> SyncHandle {
        // Subscribe before spawning so no change slips in between
        let mut feed = self.inner.storage.watch();
        let store = self.clone();

        info!(key = %store.key(), "Starting wishlist sync");

        let task = tokio::spawn(async move {
            tokio::task::yield_now().await;
            store.reload();

            while let Some(event) = feed.recv().await {
                if event.affects(store.key()) {
                    debug!(key = ?event.key, "Wishlist changed elsewhere, reloading");
                    store.reload();
                }
            }

            debug!("Storage change feed closed, stopping wishlist sync");
        });

        SyncHandle { task }
    }
}
