//! Wishlist of saved anime and manga.
//!
//! [`WishlistStore`] keeps the saved entries in memory, writes every change to
//! a [`shared::KeyValueStorage`] key, tells registered listeners about each
//! change, and (with [`WishlistStore::start_sync`]) follows writes made to the
//! same key by other contexts.

pub mod observer;
pub mod store;
pub mod sync;

pub use observer::{Registry, Subscription};
pub use store::{WishlistStore, DEFAULT_STORAGE_KEY};
pub use sync::SyncHandle;
