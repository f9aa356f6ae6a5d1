// Directory-backed shared storage for processes on one machine.
//
// Each key is one `<key>.json` file holding `{ "value", "origin" }`.
// Writes go to a temp file and are renamed into place, so readers never
// see a partial record. Changes are detected by polling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{SharedStorage, StorageChange};
use crate::error::CoreError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Record {
    value: String,
    origin: String,
}

/// A shared directory. Every `FileStorage::open` call is its own context.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    origin: String,
    poll_interval: Duration,
}

impl FileStorage {
    /// Open (creating if needed) the shared directory.
    pub fn open(dir: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self, CoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::Storage {
            message: format!("cannot create {}: {e}", dir.display()),
        })?;
        Ok(Self {
            dir,
            origin: Uuid::new_v4().to_string(),
            poll_interval,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// This context's identity as recorded in written files.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl SharedStorage for FileStorage {
    async fn write(&self, key: &str, value: &str) -> Result<(), CoreError> {
        validate_key(key)?;
        let record = Record {
            value: value.to_owned(),
            origin: self.origin.clone(),
        };
        let body = serde_json::to_vec(&record).map_err(CoreError::storage)?;

        // Unique per write so concurrent signals never share a temp file.
        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(CoreError::storage)?;
        tokio::fs::rename(&tmp, self.record_path(key))
            .await
            .map_err(CoreError::storage)?;
        trace!(key, "storage record written");
        Ok(())
    }

    fn changes(&self) -> BoxStream<'static, StorageChange> {
        // Baseline now, so only writes after this call are reported.
        let mut known: HashMap<String, String> = scan(&self.dir)
            .into_iter()
            .map(|(key, record)| (key, record.value))
            .collect();
        let dir = self.dir.clone();
        let origin = self.origin.clone();
        let poll_interval = self.poll_interval;

        Box::pin(async_stream::stream! {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let scan_dir = dir.clone();
                let records = match tokio::task::spawn_blocking(move || scan(&scan_dir)).await {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(error = %e, "storage scan task failed");
                        continue;
                    }
                };

                for (key, record) in records {
                    if known.get(&key) == Some(&record.value) {
                        continue;
                    }
                    known.insert(key.clone(), record.value.clone());
                    if record.origin == origin {
                        continue;
                    }
                    debug!(%key, "shared storage key changed");
                    yield StorageChange { key, value: record.value };
                }
            }
        })
    }
}

/// Keys become file names, so keep them to a safe alphabet.
fn validate_key(key: &str) -> Result<(), CoreError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(CoreError::Storage {
            message: format!("invalid storage key {key:?}"),
        })
    }
}

/// Read every well-formed record in `dir`. Unreadable files are skipped.
fn scan(dir: &Path) -> Vec<(String, Record)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let parsed = std::fs::read_to_string(&path)
            .ok()
            .and_then(|body| serde_json::from_str::<Record>(&body).ok());
        match parsed {
            Some(record) => records.push((key.to_owned(), record)),
            None => trace!(path = %path.display(), "skipping unreadable storage record"),
        }
    }
    records
}
