// ── Entity store ──
//
// One store per record type. Holds the last authoritative snapshot and
// its load status, fans changes out to subscribers, and serializes reads
// against the server: at most one read is in flight, callers of
// `refresh()` join it, and notifications that arrive meanwhile collapse
// into a single trailing read.

mod registry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use orgsync_api::{EntityId, EntityKind, Resource, ResourceApi};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
pub use registry::Subscription;
use registry::Registry;

// ── Snapshot ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StoreStatus {
    #[default]
    Idle,
    Loading,
    Error,
}

/// Immutable view of one store at a point in time.
#[derive(Debug)]
pub struct EntitySnapshot<R> {
    pub items: Arc<Vec<R>>,
    pub status: StoreStatus,
    /// Set only while `status` is `Error`.
    pub error: Option<String>,
}

impl<R> EntitySnapshot<R> {
    fn empty() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            status: StoreStatus::Idle,
            error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == StoreStatus::Loading
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<R: Resource> EntitySnapshot<R> {
    pub fn find(&self, id: &EntityId) -> Option<&R> {
        self.items.iter().find(|r| r.id() == id)
    }
}

pub type SnapshotSubscription<R> = Subscription<Arc<EntitySnapshot<R>>>;

/// Anything the change bus can ask to re-read.
pub trait RefreshTarget: Send + Sync {
    fn request_refresh(&self);
}

// ── EntityStore ──────────────────────────────────────────────────────

type ReadOutcome<R> = Result<Arc<EntitySnapshot<R>>, String>;

/// Authoritative local copy of one record collection.
///
/// Cheaply cloneable; clones share state.
pub struct EntityStore<R: Resource> {
    inner: Arc<StoreInner<R>>,
}

impl<R: Resource> Clone for EntityStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<R: Resource> {
    api: Arc<dyn ResourceApi<R>>,
    current: ArcSwap<EntitySnapshot<R>>,
    subscribers: Arc<Registry<Arc<EntitySnapshot<R>>>>,
    reads: Mutex<ReadSlot<R>>,
}

struct ReadSlot<R> {
    in_flight: bool,
    /// A notification arrived during the in-flight read.
    dirty: bool,
    waiters: Vec<oneshot::Sender<ReadOutcome<R>>>,
}

impl<R: Resource> EntityStore<R> {
    pub fn new(api: Arc<dyn ResourceApi<R>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                api,
                current: ArcSwap::from_pointee(EntitySnapshot::empty()),
                subscribers: Registry::new(),
                reads: Mutex::new(ReadSlot {
                    in_flight: false,
                    dirty: false,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        R::KIND
    }

    /// Last-known value. Never blocks.
    pub fn snapshot(&self) -> Arc<EntitySnapshot<R>> {
        self.inner.current.load_full()
    }

    /// Current snapshot first, then every change until dropped.
    pub fn subscribe(&self) -> SnapshotSubscription<R> {
        self.inner
            .subscribers
            .attach(|| self.inner.current.load_full())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Re-read the collection and return the resulting snapshot.
    ///
    /// Joins the read already in flight if there is one.
    pub async fn refresh(&self) -> Result<Arc<EntitySnapshot<R>>, CoreError> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut reads = self.inner.lock_reads();
            reads.waiters.push(tx);
            !std::mem::replace(&mut reads.in_flight, true)
        };
        if start {
            self.spawn_reads();
        } else {
            trace!(entity = %R::KIND, "joining in-flight refresh");
        }

        match rx.await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(message)) => Err(CoreError::RefreshFailed {
                entity: R::KIND,
                message,
            }),
            Err(_) => Err(CoreError::Internal(format!(
                "{} refresh task ended without a result",
                R::KIND
            ))),
        }
    }

    /// Fire-and-forget refresh used for change notifications.
    ///
    /// Starts a read when idle. During a read it only marks the store
    /// dirty, so any number of notifications yields one trailing read.
    pub fn request_refresh(&self) {
        let start = {
            let mut reads = self.inner.lock_reads();
            if reads.in_flight {
                reads.dirty = true;
                false
            } else {
                reads.in_flight = true;
                true
            }
        };
        if start {
            self.spawn_reads();
        } else {
            trace!(entity = %R::KIND, "refresh already running, marked dirty");
        }
    }

    /// Fetch one record straight from the server. Does not touch the snapshot.
    pub async fn fetch(&self, id: &EntityId) -> Result<R, CoreError> {
        Ok(self.inner.api.fetch(id).await?)
    }

    /// Drop every subscriber. Used on session shutdown.
    pub(crate) fn close(&self) {
        self.inner.subscribers.clear();
    }

    fn spawn_reads(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.read_loop().await });
    }
}

impl<R: Resource> RefreshTarget for EntityStore<R> {
    fn request_refresh(&self) {
        EntityStore::request_refresh(self);
    }
}

impl<R: Resource> StoreInner<R> {
    fn lock_reads(&self) -> MutexGuard<'_, ReadSlot<R>> {
        self.reads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: EntitySnapshot<R>) -> Arc<EntitySnapshot<R>> {
        let next = Arc::new(next);
        self.subscribers.publish(|| {
            self.current.store(Arc::clone(&next));
            Arc::clone(&next)
        });
        next
    }

    /// Run reads until no notification arrived during the last one.
    async fn read_loop(&self) {
        loop {
            let outcome = self.read_once().await;

            let (waiters, again) = {
                let mut reads = self.lock_reads();
                let waiters = std::mem::take(&mut reads.waiters);
                let again = std::mem::take(&mut reads.dirty);
                reads.in_flight = again;
                (waiters, again)
            };
            for waiter in waiters {
                // A caller that stopped waiting is fine.
                let _ = waiter.send(outcome.clone());
            }
            if !again {
                break;
            }
            debug!(entity = %R::KIND, "running trailing refresh");
        }
    }

    async fn read_once(&self) -> ReadOutcome<R> {
        let prior = self.current.load_full();
        self.publish(EntitySnapshot {
            items: Arc::clone(&prior.items),
            status: StoreStatus::Loading,
            error: None,
        });

        match self.api.read_all().await {
            Ok(items) => {
                debug!(entity = %R::KIND, count = items.len(), "refresh complete");
                Ok(self.publish(EntitySnapshot {
                    items: Arc::new(items),
                    status: StoreStatus::Idle,
                    error: None,
                }))
            }
            Err(e) => {
                let mut message = e.to_string();
                if message.is_empty() {
                    message = format!("failed to load {} records", R::KIND);
                }
                warn!(entity = %R::KIND, error = %message, "refresh failed");
                self.publish(EntitySnapshot {
                    items: Arc::clone(&prior.items),
                    status: StoreStatus::Error,
                    error: Some(message.clone()),
                });
                Err(message)
            }
        }
    }
}
