//! Configuration for the orgsync CLI.
//!
//! TOML profiles loaded with figment (file + `ORGSYNC_` environment),
//! and translation to `orgsync_core::SessionConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orgsync_core::{
    Backoff, DEFAULT_NAMESPACE, ReconnectConfig, SessionConfig, StorageBackend, TlsMode,
    TransportConfig,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// A config with one `default` profile pointing at a local server.
    pub fn starter() -> Self {
        let mut config = Self::default();
        config.profiles.insert("default".into(), Profile::local());
        config
    }

    /// Resolve `name`, then `default_profile`, then `"default"`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named server profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// REST root, e.g. "http://localhost:3000/api".
    pub api_url: String,

    /// Socket.IO origin. Defaults to the origin of `api_url`.
    pub socket_url: Option<String>,

    /// Push namespace. Defaults to "/office-management".
    pub namespace: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override the insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override the request timeout (seconds).
    pub timeout: Option<u64>,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// Directory shared with other orgsync processes for change signals.
    pub storage_dir: Option<PathBuf>,

    /// How often the shared directory is polled (milliseconds).
    pub storage_poll_ms: Option<u64>,

    /// Refresh after local mutations while the push channel is down.
    pub fallback_refresh: Option<bool>,
}

impl Profile {
    fn local() -> Self {
        Self {
            api_url: "http://localhost:3000/api".into(),
            socket_url: None,
            namespace: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            reconnect: ReconnectSettings::default(),
            storage_dir: None,
            storage_poll_ms: None,
            fallback_refresh: None,
        }
    }
}

/// Push reconnection schedule as written in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Attempts before giving up. `0` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: Backoff,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_delay_ms() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl From<&ReconnectSettings> for ReconnectConfig {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            delay: Duration::from_millis(settings.delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: (settings.max_attempts > 0).then_some(settings.max_attempts),
            backoff: settings.backoff,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "orgsync").map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default directory for cross-process change signals.
pub fn default_storage_dir() -> PathBuf {
    ProjectDirs::from("", "", "orgsync").map_or_else(
        || dirs_fallback().join("shared"),
        |dirs| dirs.cache_dir().join("shared"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("orgsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest with `__`, e.g.
/// `ORGSYNC_PROFILES__DEFAULT__API_URL`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ORGSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Session translation ─────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let socket_url = profile
        .socket_url
        .as_deref()
        .map(|raw| parse_url("socket_url", raw))
        .transpose()?;

    let namespace = profile
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.into());
    if !namespace.starts_with('/') {
        return Err(ConfigError::Validation {
            field: "namespace".into(),
            reason: format!("must start with '/', got '{namespace}'"),
        });
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let poll_interval = profile
        .storage_poll_ms
        .map_or(orgsync_core::relay::DEFAULT_POLL_INTERVAL, Duration::from_millis);
    let storage = StorageBackend::Directory {
        path: profile
            .storage_dir
            .clone()
            .unwrap_or_else(default_storage_dir),
        poll_interval,
    };

    Ok(SessionConfig {
        api_url,
        socket_url,
        namespace,
        transport: TransportConfig {
            tls,
            timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
            ..TransportConfig::default()
        },
        reconnect: ReconnectConfig::from(&profile.reconnect),
        storage,
        fallback_refresh: profile.fallback_refresh.unwrap_or(true),
        push: true,
        preload: true,
    })
}
