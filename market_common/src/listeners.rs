//! Listener registry used by every store to publish state changes.
//!
//! Stores keep their state behind their own locks and call `Listeners::notify` after
//! releasing them, so a callback may freely read the store it was notified by.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier returned by `subscribe`, used to unsubscribe later.
pub type ListenerId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Set of callbacks interested in values of type `T`.
pub struct Listeners<T> {
    inner: Mutex<Registry<T>>,
}

struct Registry<T> {
    next_id: ListenerId,
    callbacks: Vec<(ListenerId, Callback<T>)>,
}

impl<T> Listeners<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Listeners {
            inner: Mutex::new(Registry {
                next_id: 1,
                callbacks: Vec::new(),
            }),
        }
    }

    /// Register `callback` and return its id.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut registry = lock(&self.inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Remove the callback registered under `id`. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registry = lock(&self.inner);
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(cid, _)| *cid != id);
        registry.callbacks.len() != before
    }

    /// Deliver `value` to the callback registered under `id` only.
    pub fn notify_one(&self, id: ListenerId, value: &T) {
        let callback = lock(&self.inner)
            .callbacks
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, cb)| Arc::clone(cb));
        if let Some(callback) = callback {
            callback(value);
        }
    }

    /// Deliver `value` to every registered callback.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = lock(&self.inner)
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        lock(&self.inner).callbacks.len()
    }

    /// `true` when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// Store state is only ever replaced wholesale under the lock, so a poisoned guard
/// still holds a consistent value.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
