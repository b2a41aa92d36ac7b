//! Ordered callback registry with per-callback isolation
//!
//! A panic inside one callback is caught and logged; the remaining callbacks
//! still run and the emitter is unaffected.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a registered callback
pub type CallbackId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct CallbackList<T> {
    name: &'static str,
    callbacks: RwLock<Vec<(CallbackId, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> CallbackList<T> {
    /// `name` identifies the list in log output
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Returns whether a callback was removed
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(callback_id, _)| *callback_id != id);
        callbacks.len() != before
    }

    pub fn clear(&self) {
        self.callbacks.write().clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Invoke every callback in registration order.
    ///
    /// Callbacks run outside the registry lock, so they may register or
    /// remove callbacks themselves. Returns how many callbacks panicked.
    pub fn notify(&self, value: &T) -> usize {
        let snapshot: Vec<(CallbackId, Callback<T>)> = self.callbacks.read().clone();

        let mut failures = 0;
        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                failures += 1;
                tracing::warn!("{} callback {} panicked, continuing", self.name, id);
            }
        }
        failures
    }
}
