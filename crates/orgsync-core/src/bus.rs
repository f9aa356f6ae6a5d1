// ── Change notification bus ──
//
// Bridges the two inbound change channels (push events from the server,
// signals from sibling contexts) to store refreshes. Payloads are never
// interpreted: any arrival for a record type means "re-read it".

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use indexmap::IndexMap;
use orgsync_api::{EntityKind, TransportChannel};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::relay::BroadcastRelay;
use crate::store::RefreshTarget;

const NOTICE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// Where a change notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Push(ChangeAction),
    CrossContext,
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push(action) => write!(f, "push:{action}"),
            Self::CrossContext => f.write_str("cross-context"),
        }
    }
}

/// A normalized "record type changed" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub kind: EntityKind,
    pub source: ChangeSource,
}

/// Push event name for a change, e.g. `staff_deleted`.
pub fn event_name(kind: EntityKind, action: ChangeAction) -> String {
    format!("{kind}_{action}")
}

/// Inverse of [`event_name`].
pub fn parse_event_name(name: &str) -> Option<(EntityKind, ChangeAction)> {
    EntityKind::iter().find_map(|kind| {
        let action = name.strip_prefix(kind.as_str())?.strip_prefix('_')?;
        Some((kind, action.parse().ok()?))
    })
}

/// Refresh targets keyed by record type.
pub type Targets = IndexMap<EntityKind, Arc<dyn RefreshTarget>>;

/// Running bus. Stops on [`stop`](Self::stop) or when its parent token
/// is cancelled.
pub struct ChangeBus {
    notices: broadcast::Sender<ChangeNotice>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeBus {
    /// Subscribe to every change source for the targets' record types and
    /// start dispatching. Subscriptions are in place when this returns.
    pub fn start(
        transport: &TransportChannel,
        relay: &BroadcastRelay,
        targets: Targets,
        cancel: CancellationToken,
    ) -> Self {
        let mut sources: Vec<BoxStream<'static, ChangeNotice>> = Vec::new();
        for &kind in targets.keys() {
            for action in ChangeAction::iter() {
                let name = event_name(kind, action);
                sources.push(
                    transport
                        .on(name)
                        .map(move |_payload| ChangeNotice {
                            kind,
                            source: ChangeSource::Push(action),
                        })
                        .boxed(),
                );
            }
            sources.push(
                relay
                    .observe(kind)
                    .map(move |_signal| ChangeNotice {
                        kind,
                        source: ChangeSource::CrossContext,
                    })
                    .boxed(),
            );
        }

        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let task = tokio::spawn(dispatch(
            stream::select_all(sources),
            targets,
            notices.clone(),
            cancel.clone(),
        ));

        Self {
            notices,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Every notification the bus acts on, for diagnostics.
    pub fn notices(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notices.subscribe()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for ChangeBus {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn dispatch(
    mut sources: stream::SelectAll<BoxStream<'static, ChangeNotice>>,
    targets: Targets,
    notices: broadcast::Sender<ChangeNotice>,
    cancel: CancellationToken,
) {
    info!(kinds = targets.len(), "change bus started");
    loop {
        let notice = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = sources.next() => match next {
                Some(notice) => notice,
                None => break,
            },
        };

        debug!(entity = %notice.kind, source = %notice.source, "change notice");
        if let Some(target) = targets.get(&notice.kind) {
            target.request_refresh();
        }
        let _ = notices.send(notice);
    }
    debug!("change bus stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use orgsync_api::websocket::{Connector, Link, ReconnectConfig, codec};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::relay::MemoryStorage;

    #[test]
    fn event_names() {
        assert_eq!(
            event_name(EntityKind::Organization, ChangeAction::Created),
            "organization_created"
        );
        assert_eq!(event_name(EntityKind::Staff, ChangeAction::Deleted), "staff_deleted");
        assert_eq!(
            parse_event_name("staff_updated"),
            Some((EntityKind::Staff, ChangeAction::Updated))
        );
        assert_eq!(parse_event_name("staff"), None);
        assert_eq!(parse_event_name("company_created"), None);
        assert_eq!(parse_event_name("pong"), None);
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl RefreshTarget for Counter {
        fn request_refresh(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct OneLink(Mutex<Option<Link>>);

    #[async_trait]
    impl Connector for OneLink {
        async fn open(&self) -> Result<Link, orgsync_api::Error> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| orgsync_api::Error::WebSocketConnect("no more links".into()))
        }
    }

    const NS: &str = "/office-management";

    async fn connected_channel() -> (TransportChannel, mpsc::Sender<String>, mpsc::Receiver<String>)
    {
        let (link, mut from_client, to_client) = Link::pair();
        let channel = TransportChannel::new(
            OneLink(Mutex::new(Some(link))),
            NS,
            ReconnectConfig::default(),
        );
        channel.connect();
        to_client
            .send(r#"0{"sid":"e","pingInterval":25000,"pingTimeout":20000}"#.into())
            .await
            .unwrap();
        from_client.recv().await.unwrap();
        to_client.send(format!("40{NS},")).await.unwrap();
        channel
            .state_changes()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();
        (channel, to_client, from_client)
    }

    #[tokio::test]
    async fn push_and_relay_changes_reach_the_right_store() {
        let (transport, to_client, _from_client) = connected_channel().await;
        let hub = MemoryStorage::new();
        let relay = BroadcastRelay::new(Arc::new(hub.context()));
        let sibling = BroadcastRelay::new(Arc::new(hub.context()));

        let orgs = Arc::new(Counter::default());
        let staff = Arc::new(Counter::default());
        let mut targets = Targets::new();
        targets.insert(EntityKind::Organization, orgs.clone() as Arc<dyn RefreshTarget>);
        targets.insert(EntityKind::Staff, staff.clone() as Arc<dyn RefreshTarget>);

        let bus = ChangeBus::start(&transport, &relay, targets, CancellationToken::new());
        let mut notices = bus.notices();

        to_client
            .send(codec::encode_event(NS, "staff_created", &json!({"_id": "s1"})))
            .await
            .unwrap();
        let notice = tokio::time::timeout(Duration::from_secs(1), notices.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            notice,
            ChangeNotice {
                kind: EntityKind::Staff,
                source: ChangeSource::Push(ChangeAction::Created)
            }
        );

        sibling.signal(EntityKind::Organization).await;
        let notice = tokio::time::timeout(Duration::from_secs(1), notices.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.source, ChangeSource::CrossContext);

        assert_eq!(staff.0.load(Ordering::SeqCst), 1);
        assert_eq!(orgs.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stopped_bus_ignores_further_events() {
        let (transport, to_client, _from_client) = connected_channel().await;
        let relay = BroadcastRelay::new(Arc::new(MemoryStorage::new().context()));
        let staff = Arc::new(Counter::default());
        let mut targets = Targets::new();
        targets.insert(EntityKind::Staff, staff.clone() as Arc<dyn RefreshTarget>);

        let bus = ChangeBus::start(&transport, &relay, targets, CancellationToken::new());
        bus.stop();
        assert!(!bus.is_running());

        to_client
            .send(codec::encode_event(NS, "staff_updated", &json!({})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(staff.0.load(Ordering::SeqCst), 0);
    }
}
