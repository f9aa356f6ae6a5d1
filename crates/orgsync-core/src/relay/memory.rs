// In-process shared storage: one hub, one handle per context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{SharedStorage, StorageChange};
use crate::error::CoreError;

const CHANGE_CAPACITY: usize = 256;

/// A key/value area shared by every context created from it.
#[derive(Clone)]
pub struct MemoryStorage {
    hub: Arc<Hub>,
}

struct Hub {
    values: DashMap<String, String>,
    changes: broadcast::Sender<Arc<Write>>,
    next_context: AtomicU64,
}

struct Write {
    origin: u64,
    change: StorageChange,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            hub: Arc::new(Hub {
                values: DashMap::new(),
                changes,
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// A new context attached to this area.
    pub fn context(&self) -> MemoryContext {
        MemoryContext {
            hub: Arc::clone(&self.hub),
            id: self.hub.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.hub.values.get(key).map(|v| v.value().clone())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's handle on a [`MemoryStorage`].
pub struct MemoryContext {
    hub: Arc<Hub>,
    id: u64,
}

#[async_trait]
impl SharedStorage for MemoryContext {
    async fn write(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let previous = self.hub.values.insert(key.to_owned(), value.to_owned());
        // Rewriting the same value is not a change.
        if previous.as_deref() != Some(value) {
            let _ = self.hub.changes.send(Arc::new(Write {
                origin: self.id,
                change: StorageChange {
                    key: key.to_owned(),
                    value: value.to_owned(),
                },
            }));
        }
        Ok(())
    }

    fn changes(&self) -> BoxStream<'static, StorageChange> {
        let me = self.id;
        BroadcastStream::new(self.hub.changes.subscribe())
            .filter_map(move |item| {
                std::future::ready(match item {
                    Ok(write) if write.origin != me => Some(write.change.clone()),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "storage change subscriber lagged");
                        None
                    }
                })
            })
            .boxed()
    }
}
