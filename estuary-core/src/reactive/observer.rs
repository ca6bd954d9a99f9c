//! Observer bookkeeping for cells.
//!
//! An observer is any callback that wants to be told when a cell's value
//! changes. Observers fire synchronously, in registration order, and only
//! for accepted (non-equal) value changes.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Unique identifier for a registered observer.
///
/// Returned by `Cell::observe` and used to remove the observer later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// An ordered set of observer callbacks for values of type `T`.
///
/// Registration order is preserved and is the order callbacks fire in.
pub(crate) struct Observers<T> {
    entries: RwLock<Vec<(ObserverId, Callback<T>)>>,
}

impl<T> Observers<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback, returning its id.
    pub(crate) fn add(&self, callback: Callback<T>) -> ObserverId {
        let id = ObserverId::new();
        self.entries.write().push((id, callback));
        id
    }

    /// Remove a callback by id. Returns whether it was present.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Drop every registered callback.
    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    /// Invoke every callback with the new value, in registration order.
    ///
    /// Callbacks must not register or remove observers on the same cell
    /// from within the notification.
    pub(crate) fn notify(&self, value: &T) {
        let entries = self.entries.read();
        for (_, callback) in entries.iter() {
            callback(value);
        }
    }

    /// Number of registered callbacks.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
