//! Subscriber registry
//!
//! Consumers register an [`Observer`] and are told when cached values change. The
//! engine uses the subscriber count to start and stop its scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// What caused a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// A poll tick decoded at least one point
    Poll { updated: Vec<String> },
    /// A write optimistically updated one point
    Write { key: String },
    /// No successful tick within the staleness window; every value is now unavailable
    Stale,
}

/// Receives cache change notifications.
///
/// Called from the engine's tasks; implementations should return quickly and read the
/// values they need through the engine afterwards.
pub trait Observer: Send + Sync {
    fn on_update(&self, event: &UpdateEvent);
}

impl<F> Observer for F
where
    F: Fn(&UpdateEvent) + Send + Sync,
{
    fn on_update(&self, event: &UpdateEvent) {
        self(event)
    }
}

/// Opaque token returned by subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(SubscriptionHandle, Arc<dyn Observer>)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`; the flag is true when it is the only subscriber.
    pub fn add(&self, observer: Arc<dyn Observer>) -> (SubscriptionHandle, bool) {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers.lock();
        observers.push((handle, observer));
        (handle, observers.len() == 1)
    }

    /// Remove `handle`; returns the remaining count, or `None` for an unknown handle.
    pub fn remove(&self, handle: SubscriptionHandle) -> Option<usize> {
        let mut observers = self.observers.lock();
        let index = observers.iter().position(|(h, _)| *h == handle)?;
        observers.remove(index);
        Some(observers.len())
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Deliver `event` to every observer, outside the registry lock.
    pub fn notify(&self, event: &UpdateEvent) {
        let observers: Vec<Arc<dyn Observer>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.on_update(event);
        }
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}
