// ── Runtime session configuration ──
//
// Describes how a session reaches the server and where it shares change
// signals. Built by the CLI from a config profile; core never reads
// config files.

use std::path::PathBuf;
use std::time::Duration;

use orgsync_api::{ReconnectConfig, TransportConfig};
use url::Url;

/// Namespace the office server publishes record events on.
pub const DEFAULT_NAMESPACE: &str = "/office-management";

/// Where cross-context change signals are exchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Private to this session. Nothing else observes its signals.
    #[default]
    Memory,
    /// A directory shared by every process on the machine.
    Directory {
        path: PathBuf,
        poll_interval: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST root, e.g. `http://localhost:3000/api`.
    pub api_url: Url,
    /// Socket.IO server origin. Defaults to the origin of `api_url`.
    pub socket_url: Option<Url>,
    pub namespace: String,
    pub transport: TransportConfig,
    pub reconnect: ReconnectConfig,
    pub storage: StorageBackend,
    /// Refresh locally after a mutation when no push echo can arrive.
    pub fallback_refresh: bool,
    /// Open the push channel on start. One-shot callers turn this off.
    pub push: bool,
    /// Load both stores on start. Off for callers that only do single
    /// reads or mutations.
    pub preload: bool,
}

impl SessionConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            socket_url: None,
            namespace: DEFAULT_NAMESPACE.into(),
            transport: TransportConfig::default(),
            reconnect: ReconnectConfig::default(),
            storage: StorageBackend::default(),
            fallback_refresh: true,
            push: true,
            preload: true,
        }
    }

    /// The server the push channel connects to.
    pub fn socket_origin(&self) -> &Url {
        self.socket_url.as_ref().unwrap_or(&self.api_url)
    }
}
