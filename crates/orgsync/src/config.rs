//! Profile resolution: config file + env + CLI flags -> `SessionConfig`.
//!
//! The config crate owns the TOML schema. This module layers the global
//! flags on top and is the single place a `SessionConfig` is built.

use orgsync_config::{Config, ConfigError, Defaults, Profile};
use orgsync_core::{SessionConfig, TlsMode};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use orgsync_config::{config_path, load_config_or_default};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the session config for a command.
///
/// A named profile that is missing is an error; a missing default
/// profile falls back to `--api-url` alone.
pub fn resolve_session_config(global: &GlobalOpts, push: bool) -> Result<SessionConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profile(Some(&profile_name)) {
        Ok((_, profile)) => profile.clone(),
        Err(ConfigError::UnknownProfile { name }) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(&cfg),
            });
        }
        Err(_) => flag_only_profile(global)?,
    };

    let mut session = apply_overrides(&profile, &cfg.defaults, global)?;
    session.push = push;
    // Commands without a live view read what they need on demand.
    session.preload = push;
    Ok(session)
}

fn flag_only_profile(global: &GlobalOpts) -> Result<Profile, CliError> {
    let api_url = global.api_url.clone().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let mut profile = Config::starter()
        .profiles
        .remove("default")
        .ok_or_else(|| CliError::Internal("starter config has no default profile".into()))?;
    profile.api_url = api_url;
    Ok(profile)
}

fn apply_overrides(
    profile: &Profile,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<SessionConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if let Some(ref url) = global.socket_url {
        profile.socket_url = Some(url.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let mut session = orgsync_config::profile_to_session_config(&profile, defaults)?;
    if global.insecure {
        session.transport.tls = TlsMode::DangerAcceptInvalid;
    }
    Ok(session)
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

