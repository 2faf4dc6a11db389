//! Synchronous multi-consumer broadcast.
//!
//! A [`Hub`] keeps an ordered list of handlers. [`Hub::publish`] calls every
//! handler registered at the time of the call, in registration order, on the
//! publishing thread. A handler that panics is logged and skipped; the others
//! still run and the list stays intact.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::error;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler<T>)>>,
}

/// Broadcast point for one kind of event.
pub struct Hub<T> {
    name: &'static str,
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Hub<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `handler`. It stays registered until
    /// [`Subscription::unsubscribe`] is called; dropping the handle does not
    /// remove it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push((id, Arc::new(handler)));

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every handler registered right now.
    pub fn publish(&self, event: &T) {
        // Snapshot so handlers may (un)subscribe while being called.
        let snapshot: Vec<(u64, Handler<T>)> = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for (id, handler) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(hub = self.name, handler = id, "Event handler panicked");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Handle returned by [`Hub::subscribe`].
pub struct Subscription<T> {
    id: u64,
    hub: Weak<Inner<T>>,
}

impl<T> Subscription<T> {
    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.hub.upgrade() else {
            return false;
        };
        let mut handlers = inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        handlers.len() != before
    }
}
