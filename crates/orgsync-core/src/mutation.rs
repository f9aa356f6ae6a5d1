// ── Mutation coordinator ──
//
// Create/update/delete for one record type. A successful mutation tells
// sibling contexts through the relay; this context's own refresh arrives
// through the push echo. When the push channel is down, no echo can
// arrive, so the coordinator asks the store directly.

use std::sync::Arc;

use orgsync_api::{ConnectionState, EntityId, Resource, ResourceApi};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::relay::BroadcastRelay;
use crate::store::EntityStore;

pub struct MutationCoordinator<R: Resource> {
    api: Arc<dyn ResourceApi<R>>,
    store: EntityStore<R>,
    relay: BroadcastRelay,
    connection: watch::Receiver<ConnectionState>,
    fallback_refresh: bool,
}

impl<R: Resource> MutationCoordinator<R> {
    pub fn new(
        api: Arc<dyn ResourceApi<R>>,
        store: EntityStore<R>,
        relay: BroadcastRelay,
        connection: watch::Receiver<ConnectionState>,
        fallback_refresh: bool,
    ) -> Self {
        Self {
            api,
            store,
            relay,
            connection,
            fallback_refresh,
        }
    }

    pub async fn create(&self, draft: &R::Draft) -> Result<R, CoreError> {
        let record = self.api.create(draft).await?;
        info!(entity = %R::KIND, id = %record.id(), "created");
        self.after_success().await;
        Ok(record)
    }

    pub async fn update(&self, id: &EntityId, patch: &R::Patch) -> Result<R, CoreError> {
        let record = self.api.update(id, patch).await?;
        info!(entity = %R::KIND, %id, "updated");
        self.after_success().await;
        Ok(record)
    }

    pub async fn delete(&self, id: &EntityId) -> Result<(), CoreError> {
        self.api.delete(id).await?;
        info!(entity = %R::KIND, %id, "deleted");
        self.after_success().await;
        Ok(())
    }

    async fn after_success(&self) {
        self.relay.signal(R::KIND).await;

        let state = *self.connection.borrow();
        if self.fallback_refresh && !state.is_connected() {
            debug!(entity = %R::KIND, ?state, "push channel down, refreshing locally");
            self.store.request_refresh();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use orgsync_api::{EntityKind, NewOrganization, Organization, OrganizationPatch};

    use super::*;
    use crate::relay::MemoryStorage;

    fn org(id: &str, name: &str) -> Organization {
        Organization {
            id: EntityId::from(id),
            name: name.into(),
            address: None,
            phone: None,
            email: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// In-memory server collection.
    #[derive(Default)]
    struct FakeServer {
        rows: Mutex<Vec<Organization>>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ResourceApi<Organization> for FakeServer {
        async fn read_all(&self) -> Result<Vec<Organization>, orgsync_api::Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn fetch(&self, id: &EntityId) -> Result<Organization, orgsync_api::Error> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|o| &o.id == id)
                .cloned()
                .ok_or_else(|| orgsync_api::Error::Http {
                    status: 404,
                    message: "Organization not found".into(),
                })
        }

        async fn create(&self, draft: &NewOrganization) -> Result<Organization, orgsync_api::Error> {
            if draft.name.is_empty() {
                return Err(orgsync_api::Error::Http {
                    status: 400,
                    message: "Name is required".into(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            let created = org(&format!("o{}", rows.len() + 1), &draft.name);
            rows.push(created.clone());
            Ok(created)
        }

        async fn update(
            &self,
            id: &EntityId,
            patch: &OrganizationPatch,
        ) -> Result<Organization, orgsync_api::Error> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.iter_mut().find(|o| &o.id == id).unwrap();
            if let Some(name) = &patch.name {
                row.name.clone_from(name);
            }
            Ok(row.clone())
        }

        async fn delete(&self, id: &EntityId) -> Result<(), orgsync_api::Error> {
            self.rows.lock().unwrap().retain(|o| &o.id != id);
            Ok(())
        }
    }

    struct Fixture {
        server: Arc<FakeServer>,
        store: EntityStore<Organization>,
        coordinator: MutationCoordinator<Organization>,
        sibling: BroadcastRelay,
        state: watch::Sender<ConnectionState>,
    }

    fn fixture(fallback_refresh: bool) -> Fixture {
        let server = Arc::new(FakeServer::default());
        let api: Arc<dyn ResourceApi<Organization>> = server.clone();
        let store = EntityStore::new(Arc::clone(&api));
        let hub = MemoryStorage::new();
        let relay = BroadcastRelay::new(Arc::new(hub.context()));
        let sibling = BroadcastRelay::new(Arc::new(hub.context()));
        let (state, connection) = watch::channel(ConnectionState::Connected);
        let coordinator =
            MutationCoordinator::new(api, store.clone(), relay, connection, fallback_refresh);
        Fixture {
            server,
            store,
            coordinator,
            sibling,
            state,
        }
    }

    #[tokio::test]
    async fn success_signals_siblings_without_local_refresh_while_connected() {
        let f = fixture(true);
        let mut signals = f.sibling.observe(EntityKind::Organization);

        let created = f
            .coordinator
            .create(&NewOrganization {
                name: "Acme".into(),
                ..NewOrganization::default()
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Acme");

        tokio::time::timeout(Duration::from_secs(1), signals.next())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.server.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_local_refresh_when_disconnected() {
        let f = fixture(true);
        f.state.send_replace(ConnectionState::GivenUp);
        let mut sub = f.store.subscribe();

        f.coordinator
            .create(&NewOrganization {
                name: "Acme".into(),
                ..NewOrganization::default()
            })
            .await
            .unwrap();

        let settled = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let snapshot = sub.next().await.unwrap();
                if snapshot.len() == 1 && !snapshot.is_loading() {
                    return snapshot;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(settled.items[0].name, "Acme");
        assert_eq!(f.server.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_can_be_disabled() {
        let f = fixture(false);
        f.state.send_replace(ConnectionState::Disconnected);

        f.coordinator.delete(&EntityId::from("missing")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.server.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_is_returned_without_signal() {
        let f = fixture(true);
        f.state.send_replace(ConnectionState::Disconnected);
        let mut signals = f.sibling.observe(EntityKind::Organization);

        let err = f
            .coordinator
            .create(&NewOrganization::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Name is required");

        let signal = tokio::time::timeout(Duration::from_millis(50), signals.next()).await;
        assert!(signal.is_err());
        assert_eq!(f.server.reads.load(Ordering::SeqCst), 0);
        assert!(f.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn update_returns_the_server_record() {
        let f = fixture(true);
        let created = f
            .coordinator
            .create(&NewOrganization {
                name: "Acme".into(),
                ..NewOrganization::default()
            })
            .await
            .unwrap();
        let updated = f
            .coordinator
            .update(
                &created.id,
                &OrganizationPatch {
                    name: Some("Acme Corp".into()),
                    ..OrganizationPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme Corp");
    }
}
