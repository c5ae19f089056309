//! Shared configuration for the homelink CLI and relay.
//!
//! TOML profiles, token resolution (env + plaintext + keyring), and
//! translation to `homelink_core::SessionConfig`,
//! `homelink_bridge::BridgeConfig` and `homelink_core::BridgeClientConfig`.
//! The CLI layers its flag overrides on top.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use homelink_bridge::BridgeConfig;
use homelink_core::{AccessToken, BridgeClientConfig, Eviction, SessionConfig, TlsVerification};

const KEYRING_SERVICE: &str = "homelink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

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
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Relay settings for `serve` and `watch`.
    #[serde(default)]
    pub bridge: BridgeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
            bridge: BridgeSettings::default(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.clone() })?;
        Ok((name, profile))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// REST timeout in seconds.
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

/// A named backend profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "http://homeassistant.local:8123").
    pub url: String,

    /// Explicit WebSocket URL; derived from `url` when unset.
    pub websocket_url: Option<String>,

    /// Access token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,

    /// REST timeout override, seconds.
    pub timeout: Option<u64>,

    pub reconnect_delay_ms: Option<u64>,
    pub service_timeout_ms: Option<u64>,
    pub eviction: Option<Eviction>,

    /// Use REST for follow-up refreshes (default true).
    pub rest: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeSettings {
    /// Listen address for `serve`.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Relay URL for `watch`.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Push-stream keep-alive comment period, seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,

    /// Downstream poll period, milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            relay_url: default_relay_url(),
            keepalive: default_keepalive(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}
fn default_relay_url() -> String {
    "http://127.0.0.1:3000".into()
}
fn default_keepalive() -> u64 {
    15
}
fn default_poll_interval() -> u64 {
    2000
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "homelink", "homelink").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("homelink");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `HOMELINK_` env vars.
///
/// Nested keys use a double underscore:
/// `HOMELINK_BRIDGE__BIND=0.0.0.0:3000`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOMELINK_").ignore(&["token", "profile", "log"]).split("__"))
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    Ok(figment(path).extract()?)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))?)
}

/// Resolve the access token without CLI flags:
/// `token_env`, then the plaintext `token`, then the system keyring.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring under the profile's name.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `SessionConfig` from a profile and an already resolved token.
pub fn session_config(
    profile: &Profile,
    defaults: &Defaults,
    token: SecretString,
) -> Result<SessionConfig, ConfigError> {
    let url = parse_url("url", &profile.url)?;
    let mut config = SessionConfig::new(url, AccessToken::from(token));

    config.websocket_url = profile
        .websocket_url
        .as_deref()
        .map(|raw| parse_url("websocket_url", raw))
        .transpose()?;

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(ms) = profile.reconnect_delay_ms {
        config.reconnect_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.service_timeout_ms {
        config.service_timeout = Duration::from_millis(ms);
    }
    if let Some(eviction) = profile.eviction {
        config.eviction = eviction;
    }
    config.rest_enabled = profile.rest.unwrap_or(true);

    Ok(config)
}

/// Build a `SessionConfig` from a profile, resolving its token.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    session_config(profile, defaults, token)
}

/// Relay configuration around an upstream session.
pub fn bridge_config(settings: &BridgeSettings, session: SessionConfig) -> Result<BridgeConfig, ConfigError> {
    let bind: SocketAddr = settings.bind.parse().map_err(|e| ConfigError::Validation {
        field: "bridge.bind".into(),
        reason: format!("invalid socket address '{}': {e}", settings.bind),
    })?;

    let mut config = BridgeConfig::new(session);
    config.bind = bind;
    config.sse_keepalive = Duration::from_secs(settings.keepalive);
    Ok(config)
}

/// Downstream client configuration for `watch`.
pub fn bridge_client_config(settings: &BridgeSettings) -> Result<BridgeClientConfig, ConfigError> {
    let mut config = BridgeClientConfig::new(parse_url("bridge.relay_url", &settings.relay_url)?);
    config.poll_interval = Duration::from_millis(settings.poll_interval_ms);
    Ok(config)
}
