// ── Cross-context broadcast relay ──
//
// Sibling contexts on one machine share a key/value area. A successful
// local mutation writes a fresh token under the record type's channel key;
// every other context sees the key change and re-reads. Tokens are
// advisory: only the fact that the key changed matters.

mod file;
mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use orgsync_api::EntityKind;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
pub use file::{DEFAULT_POLL_INTERVAL, FileStorage};
pub use memory::{MemoryContext, MemoryStorage};

const KEY_PREFIX: &str = "office_";
const KEY_SUFFIX: &str = "_update";

/// The shared key for one record type, e.g. `office_staff_update`.
pub fn channel_key(kind: EntityKind) -> String {
    format!("{KEY_PREFIX}{kind}{KEY_SUFFIX}")
}

/// Inverse of [`channel_key`]. `None` for keys the relay does not own.
pub fn parse_channel_key(key: &str) -> Option<EntityKind> {
    key.strip_prefix(KEY_PREFIX)?
        .strip_suffix(KEY_SUFFIX)?
        .parse()
        .ok()
}

/// One write to the shared area made by a different context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub value: String,
}

/// Key/value area shared between contexts.
///
/// `changes()` reports writes made by other contexts only; a context
/// never observes its own writes.
#[async_trait]
pub trait SharedStorage: Send + Sync + 'static {
    async fn write(&self, key: &str, value: &str) -> Result<(), CoreError>;

    /// Foreign writes from now on. Registration is immediate, so a write
    /// that lands after this call returns is never missed.
    fn changes(&self) -> BoxStream<'static, StorageChange>;
}

/// A decoded change signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSignal {
    pub kind: EntityKind,
    pub token: u64,
}

/// Writes and observes change signals for one context.
#[derive(Clone)]
pub struct BroadcastRelay {
    storage: Arc<dyn SharedStorage>,
    last_token: Arc<AtomicU64>,
}

impl BroadcastRelay {
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        Self {
            storage,
            last_token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Tell sibling contexts that `kind` changed.
    ///
    /// Storage failures are logged; a mutation that already succeeded is
    /// never failed by its notification.
    pub async fn signal(&self, kind: EntityKind) -> BroadcastSignal {
        let token = self.next_token();
        let key = channel_key(kind);
        match self.storage.write(&key, &token.to_string()).await {
            Ok(()) => debug!(%key, token, "change signal written"),
            Err(e) => warn!(%key, error = %e, "failed to write change signal"),
        }
        BroadcastSignal { kind, token }
    }

    /// Signals for `kind` written by other contexts.
    pub fn observe(&self, kind: EntityKind) -> BoxStream<'static, BroadcastSignal> {
        self.observe_all()
            .filter(move |signal| std::future::ready(signal.kind == kind))
            .boxed()
    }

    /// Signals for every record type written by other contexts.
    pub fn observe_all(&self) -> BoxStream<'static, BroadcastSignal> {
        self.storage
            .changes()
            .filter_map(|change| std::future::ready(decode_signal(&change)))
            .boxed()
    }

    /// Millisecond wall clock, bumped when it has not advanced.
    fn next_token(&self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let previous = self
            .last_token
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(previous.saturating_add(1))
    }
}

fn decode_signal(change: &StorageChange) -> Option<BroadcastSignal> {
    let Some(kind) = parse_channel_key(&change.key) else {
        trace!(key = %change.key, "ignoring foreign storage key");
        return None;
    };
    match change.value.trim().parse::<u64>() {
        Ok(token) => Some(BroadcastSignal { kind, token }),
        Err(_) => {
            trace!(key = %change.key, value = %change.value, "ignoring malformed change token");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn channel_keys_round_trip() {
        assert_eq!(channel_key(EntityKind::Organization), "office_organization_update");
        assert_eq!(channel_key(EntityKind::Staff), "office_staff_update");
        assert_eq!(parse_channel_key("office_staff_update"), Some(EntityKind::Staff));
        assert_eq!(parse_channel_key("office_company_update"), None);
        assert_eq!(parse_channel_key("theme"), None);
    }

    #[test]
    fn tokens_strictly_increase() {
        let relay = BroadcastRelay::new(Arc::new(MemoryStorage::new().context()));
        let tokens: Vec<u64> = (0..100).map(|_| relay.next_token()).collect();
        assert!(tokens.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn signal_reaches_other_contexts_only() {
        let hub = MemoryStorage::new();
        let a = BroadcastRelay::new(Arc::new(hub.context()));
        let b = BroadcastRelay::new(Arc::new(hub.context()));

        let mut seen_by_a = a.observe(EntityKind::Staff);
        let mut seen_by_b = b.observe(EntityKind::Staff);

        let sent = a.signal(EntityKind::Staff).await;
        let received = tokio::time::timeout(Duration::from_secs(1), seen_by_b.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, sent);

        let echo = tokio::time::timeout(Duration::from_millis(50), seen_by_a.next()).await;
        assert!(echo.is_err(), "a context must not observe its own signal");
    }

    #[tokio::test]
    async fn malformed_and_foreign_writes_are_ignored() {
        let hub = MemoryStorage::new();
        let writer = hub.context();
        let reader = BroadcastRelay::new(Arc::new(hub.context()));
        let mut signals = reader.observe_all();

        writer.write("office_staff_update", "not-a-number").await.unwrap();
        writer.write("theme", "dark").await.unwrap();
        writer.write("office_organization_update", "42").await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), signals.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            first,
            BroadcastSignal {
                kind: EntityKind::Organization,
                token: 42
            }
        );
    }

    #[tokio::test]
    async fn observe_filters_by_kind() {
        let hub = MemoryStorage::new();
        let writer = BroadcastRelay::new(Arc::new(hub.context()));
        let reader = BroadcastRelay::new(Arc::new(hub.context()));
        let mut orgs = reader.observe(EntityKind::Organization);

        writer.signal(EntityKind::Staff).await;
        let org_signal = writer.signal(EntityKind::Organization).await;

        let received = tokio::time::timeout(Duration::from_secs(1), orgs.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, org_signal);
    }
}
