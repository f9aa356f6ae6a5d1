// ── Session ──
//
// Owns the session-wide singletons: one push channel, one relay, one store
// and one coordinator per record type, and the bus wiring them together.
// Built once by `start`/`from_parts`, torn down by `shutdown`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use orgsync_api::websocket::Connector;
use orgsync_api::{
    ConnectionState, EntityId, EntityKind, OfficeApi, Organization, OrganizationOption,
    ReconnectConfig, ResourceApi, RestClient, Staff, TransportChannel, WsConnector,
};
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{ChangeBus, ChangeNotice, Targets};
use crate::config::{SessionConfig, StorageBackend};
use crate::error::CoreError;
use crate::mutation::MutationCoordinator;
use crate::relay::{BroadcastRelay, FileStorage, MemoryStorage, SharedStorage};
use crate::report::DashboardSummary;
use crate::store::{EntityStore, RefreshTarget};

pub const PING_EVENT: &str = "ping";
pub const PONG_EVENT: &str = "pong";
/// Informational acknowledgement the server emits after a join.
pub const CONNECTED_EVENT: &str = "connected";

/// Pre-built collaborators for a session. Lets tests and embedders swap
/// in their own API, link, and storage.
pub struct SessionParts<A> {
    pub api: Arc<A>,
    pub connector: Arc<dyn Connector>,
    pub storage: Arc<dyn SharedStorage>,
    pub namespace: String,
    pub reconnect: ReconnectConfig,
    pub fallback_refresh: bool,
    pub push: bool,
    pub preload: bool,
}

/// A running sync session.
///
/// Cheaply cloneable. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: Arc<dyn OfficeApi>,
    transport: TransportChannel,
    relay: BroadcastRelay,
    organizations: EntityStore<Organization>,
    staff: EntityStore<Staff>,
    organization_mutations: MutationCoordinator<Organization>,
    staff_mutations: MutationCoordinator<Staff>,
    bus: ChangeBus,
    cancel: CancellationToken,
}

impl Session {
    /// Build the production collaborators from `config` and start.
    pub fn start(config: &SessionConfig) -> Result<Self, CoreError> {
        let api = Arc::new(RestClient::new(config.api_url.clone(), &config.transport)?);
        let connector: Arc<dyn Connector> = Arc::new(WsConnector::new(config.socket_origin())?);
        let storage: Arc<dyn SharedStorage> = match &config.storage {
            StorageBackend::Memory => Arc::new(MemoryStorage::new().context()),
            StorageBackend::Directory {
                path,
                poll_interval,
            } => Arc::new(FileStorage::open(path, *poll_interval)?),
        };

        info!(api = %config.api_url, push = config.push, "starting session");
        Ok(Self::from_parts(SessionParts {
            api,
            connector,
            storage,
            namespace: config.namespace.clone(),
            reconnect: config.reconnect.clone(),
            fallback_refresh: config.fallback_refresh,
            push: config.push,
            preload: config.preload,
        }))
    }

    /// Wire the pipeline, then connect and kick off the initial load of
    /// both stores when enabled.
    pub fn from_parts<A: OfficeApi>(parts: SessionParts<A>) -> Self {
        let cancel = CancellationToken::new();
        let transport =
            TransportChannel::with_connector(parts.connector, parts.namespace, parts.reconnect);
        let relay = BroadcastRelay::new(parts.storage);

        let organization_api: Arc<dyn ResourceApi<Organization>> = parts.api.clone();
        let staff_api: Arc<dyn ResourceApi<Staff>> = parts.api.clone();
        let organizations = EntityStore::new(Arc::clone(&organization_api));
        let staff = EntityStore::new(Arc::clone(&staff_api));

        let organization_mutations = MutationCoordinator::new(
            organization_api,
            organizations.clone(),
            relay.clone(),
            transport.state_changes(),
            parts.fallback_refresh,
        );
        let staff_mutations = MutationCoordinator::new(
            staff_api,
            staff.clone(),
            relay.clone(),
            transport.state_changes(),
            parts.fallback_refresh,
        );

        let mut targets = Targets::new();
        targets.insert(
            EntityKind::Organization,
            Arc::new(organizations.clone()) as Arc<dyn RefreshTarget>,
        );
        targets.insert(
            EntityKind::Staff,
            Arc::new(staff.clone()) as Arc<dyn RefreshTarget>,
        );
        let bus = ChangeBus::start(&transport, &relay, targets, cancel.child_token());

        if parts.push {
            transport.connect();
        }
        if parts.preload {
            organizations.request_refresh();
            staff.request_refresh();
        }

        let api: Arc<dyn OfficeApi> = parts.api;
        Self {
            inner: Arc::new(SessionInner {
                api,
                transport,
                relay,
                organizations,
                staff,
                organization_mutations,
                staff_mutations,
                bus,
                cancel,
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn organizations(&self) -> &EntityStore<Organization> {
        &self.inner.organizations
    }

    pub fn staff(&self) -> &EntityStore<Staff> {
        &self.inner.staff
    }

    pub fn organization_mutations(&self) -> &MutationCoordinator<Organization> {
        &self.inner.organization_mutations
    }

    pub fn staff_mutations(&self) -> &MutationCoordinator<Staff> {
        &self.inner.staff_mutations
    }

    pub fn transport(&self) -> &TransportChannel {
        &self.inner.transport
    }

    pub fn relay(&self) -> &BroadcastRelay {
        &self.inner.relay
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.transport.current_state()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.transport.state_changes()
    }

    /// Every change notification the bus acts on.
    pub fn notices(&self) -> broadcast::Receiver<ChangeNotice> {
        self.inner.bus.notices()
    }

    /// Payloads of the server's `connected` acknowledgement.
    pub fn server_acks(&self) -> BoxStream<'static, Value> {
        self.inner.transport.on(CONNECTED_EVENT)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub async fn organization_options(&self) -> Result<Vec<OrganizationOption>, CoreError> {
        Ok(self.inner.api.organization_options().await?)
    }

    pub async fn staff_for_organization(&self, id: &EntityId) -> Result<Vec<Staff>, CoreError> {
        Ok(self.inner.api.staff_for_organization(id).await?)
    }

    pub fn dashboard(&self) -> DashboardSummary {
        DashboardSummary::build(
            &self.inner.organizations.snapshot().items,
            &self.inner.staff.snapshot().items,
            self.connection_state().is_connected(),
        )
    }

    /// Round-trip a `ping` event and wait for the server's `pong`.
    pub async fn ping(&self, timeout: Duration) -> Result<Duration, CoreError> {
        if !self.connection_state().is_connected() {
            return Err(CoreError::NotConnected);
        }
        let mut pongs = self.inner.transport.on(PONG_EVENT);
        let started = tokio::time::Instant::now();
        self.inner.transport.send(
            PING_EVENT,
            &json!({ "timestamp": chrono::Utc::now().to_rfc3339() }),
        );

        match tokio::time::timeout(timeout, pongs.next()).await {
            Ok(Some(_)) => Ok(started.elapsed()),
            Ok(None) => Err(CoreError::NotConnected),
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Close the connection, stop the bus, and end every subscription.
    pub fn shutdown(&self) {
        debug!("shutting down session");
        self.inner.cancel.cancel();
        self.inner.bus.stop();
        self.inner.transport.shutdown();
        self.inner.organizations.close();
        self.inner.staff.close();
        info!("session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

// The connection loop holds its own handle to the channel, so the last
// session handle going away has to stop it explicitly.
impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!("last session handle dropped, stopping push channel");
            self.cancel.cancel();
            self.bus.stop();
            self.transport.shutdown();
        }
    }
}
