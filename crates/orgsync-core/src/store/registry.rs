// ── Ordered subscriber registry ──
//
// Explicit fan-out list: one unbounded channel per subscriber, kept in
// registration order. Attaching and publishing share one lock, so a new
// subscriber sees the current value exactly once and never misses the
// next one.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use indexmap::IndexMap;
use tokio::sync::mpsc;

pub(crate) struct Registry<T> {
    next_id: AtomicU64,
    senders: Mutex<IndexMap<u64, mpsc::UnboundedSender<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            senders: Mutex::new(IndexMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<u64, mpsc::UnboundedSender<T>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detach(&self, id: u64) {
        self.lock().shift_remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop every registration. Open subscriptions end after draining.
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}

impl<T: Clone> Registry<T> {
    /// Register a subscriber whose first item is `current()`.
    pub(crate) fn attach(self: &Arc<Self>, current: impl FnOnce() -> T) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut senders = self.lock();
        // The receiver is alive, so this send cannot fail.
        let _ = tx.send(current());
        senders.insert(id, tx);
        drop(senders);

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    /// Produce the next value under the registry lock and deliver it to
    /// every subscriber in registration order.
    pub(crate) fn publish(&self, next: impl FnOnce() -> T) {
        let mut senders = self.lock();
        let value = next();
        senders.retain(|_, tx| tx.send(value.clone()).is_ok());
    }
}

/// Live registration returned by `subscribe()`.
///
/// Yields the value current at registration, then every later one.
/// Dropping it detaches.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    /// Next value, or `None` once the owner has shut down.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn first_item_is_current_value() {
        let registry = Registry::new();
        let mut sub = registry.attach(|| 7);
        assert_eq!(sub.try_next(), Some(7));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn publish_reaches_every_subscriber_once() {
        let registry = Registry::new();
        let mut a = registry.attach(|| 0);
        let mut b = registry.attach(|| 0);
        registry.publish(|| 1);

        assert_eq!((a.try_next(), a.try_next()), (Some(0), Some(1)));
        assert_eq!((b.try_next(), b.try_next()), (Some(0), Some(1)));
        assert_eq!(a.try_next(), None);
    }

    #[test]
    fn dropping_a_subscription_detaches_it() {
        let registry = Registry::new();
        let a = registry.attach(|| ());
        let _b = registry.attach(|| ());
        assert_eq!(registry.len(), 2);
        drop(a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn detach_preserves_registration_order() {
        let registry: Arc<Registry<u8>> = Registry::new();
        let a = registry.attach(|| 0);
        let _b = registry.attach(|| 0);
        let _c = registry.attach(|| 0);
        drop(a);
        registry.detach(99);
        let ids: Vec<u64> = registry.lock().keys().copied().collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn clear_ends_open_subscriptions() {
        let registry = Registry::new();
        let mut sub = registry.attach(|| "first");
        registry.clear();
        assert_eq!(sub.next().await, Some("first"));
        assert_eq!(sub.next().await, None);
    }
}
