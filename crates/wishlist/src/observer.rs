//! Listener registry with per-listener unsubscription, and an outbox that
//! delivers queued notifications in order.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A listener as captured when a notification was queued
pub(crate) type Target<T> = (u64, Callback<T>);

struct Listeners<T: ?Sized> {
    next_id: u64,
    /// Registration order is notification order
    entries: Vec<(u64, Callback<T>)>,
}

/// Removes one listener from whichever registry created it
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: ?Sized + 'static> Detach for Mutex<Listeners<T>> {
    fn detach(&self, id: u64) {
        let mut listeners = self.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Set of callbacks notified with a `&T`
pub struct Registry<T: ?Sized> {
    listeners: Arc<Mutex<Listeners<T>>>,
}

impl<T: ?Sized + 'static> Registry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners<T>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a listener; it stays registered until the returned subscription
    /// is used to remove it
    pub fn register<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(callback)));

        let detach: Arc<dyn Detach> = self.listeners.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&detach),
        }
    }

    /// Call every listener with `value`
    ///
    /// Callbacks run without the registry lock held, so a listener may
    /// register or unsubscribe from inside its callback.
    pub fn notify(&self, value: &T) {
        for (_, callback) in self.targets() {
            callback(value);
        }
    }

    /// Every listener registered right now, in registration order
    pub(crate) fn targets(&self) -> Vec<Target<T>> {
        self.listeners()
            .entries
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.listeners().entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    pub fn len(&self) -> usize {
        self.listeners().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one registered listener
///
/// Dropping it leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Remove this listener; other listeners are unaffected
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct Delivery<T: ?Sized, V> {
    targets: Vec<Target<T>>,
    value: V,
}

struct OutboxState<T: ?Sized, V> {
    queue: VecDeque<Delivery<T, V>>,
    draining: bool,
}

/// Notifications queued while the caller holds its own lock and delivered
/// afterwards, oldest first
///
/// Only one thread drains at a time, so listeners never see an older value
/// after a newer one. No lock is held while a callback runs; a value queued
/// from inside a callback is delivered once that callback returns.
pub(crate) struct Outbox<T: ?Sized, V> {
    state: Mutex<OutboxState<T, V>>,
}

impl<T: ?Sized + 'static, V: Borrow<T>> Outbox<T, V> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: VecDeque::new(),
                draining: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, OutboxState<T, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `value` for `targets`
    ///
    /// Callers push while holding the lock that orders their changes.
    pub(crate) fn push(&self, targets: Vec<Target<T>>, value: V) {
        self.state().queue.push_back(Delivery { targets, value });
    }

    /// Deliver everything queued, unless another thread already is
    ///
    /// Targets unsubscribed since their delivery was queued are skipped.
    pub(crate) fn flush(&self, registry: &Registry<T>) {
        {
            let mut state = self.state();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let mut guard = DrainGuard {
            outbox: self,
            armed: true,
        };

        loop {
            let delivery = {
                let mut state = self.state();
                match state.queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        // Released together with the empty check so a
                        // concurrent push is never stranded
                        state.draining = false;
                        guard.armed = false;
                        return;
                    }
                }
            };

            for (id, callback) in delivery.targets {
                if registry.is_registered(id) {
                    callback(delivery.value.borrow());
                }
            }
        }
    }
}

/// Hands draining back if a callback panics
struct DrainGuard<'a, T: ?Sized, V> {
    outbox: &'a Outbox<T, V>,
    armed: bool,
}

impl<T: ?Sized, V> Drop for DrainGuard<'_, T, V> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.outbox.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.draining = false;
        }
    }
}
