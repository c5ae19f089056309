// ── Runtime session configuration ──
//
// These types describe *how* to reach the backend. They carry the access
// token and connection tuning, but never touch disk. The CLI constructs a
// `SessionConfig` (via homelink-config) and hands it in.

use std::time::Duration;

use homelink_api::{AccessToken, TlsMode};
use serde::{Deserialize, Serialize};
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed installs).
    DangerAcceptInvalid,
}

impl TlsVerification {
    /// The equivalent transport-level setting.
    pub fn transport_mode(&self) -> TlsMode {
        match self {
            Self::SystemDefaults => TlsMode::System,
            Self::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            Self::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// What a bulk refresh does to cached entities missing from the new list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Eviction {
    /// Keep them; a bulk list only upserts.
    #[default]
    Retain,
    /// Upsert the list, then drop every key it did not mention.
    Prune,
}

/// Configuration for one upstream session.
///
/// Built by the CLI, passed to [`Session`](crate::Session); core never
/// reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend HTTP base URL (e.g. `http://homeassistant.local:8123`).
    /// The WebSocket URL is derived from it.
    pub url: Url,
    /// Explicit WebSocket endpoint. Derived from `url` when `None`.
    pub websocket_url: Option<Url>,
    pub token: AccessToken,
    pub tls: TlsVerification,
    /// REST request timeout.
    pub timeout: Duration,
    /// How long `connect()` waits for the first handshake outcome.
    pub connect_timeout: Duration,
    /// Fixed delay before reopening a dropped connection.
    pub reconnect_delay: Duration,
    /// Keep-alive `ping` period while authenticated.
    pub keepalive_interval: Duration,
    /// Deadline for `call_service` acknowledgements.
    pub service_timeout: Duration,
    /// Deadline for on-demand `get_states` lookups.
    pub state_timeout: Duration,
    /// Delay before the follow-up refresh of a service call's target.
    pub reconcile_delay: Duration,
    /// Lifetime of an optimistic draft value.
    pub draft_ttl: Duration,
    pub eviction: Eviction,
    /// Use the REST API for follow-up refreshes instead of `get_states`.
    pub rest_enabled: bool,
}

impl SessionConfig {
    pub fn new(url: Url, token: AccessToken) -> Self {
        Self {
            url,
            websocket_url: None,
            token,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            service_timeout: Duration::from_secs(10),
            state_timeout: Duration::from_secs(5),
            reconcile_delay: Duration::from_millis(200),
            draft_ttl: Duration::from_secs(10),
            eviction: Eviction::Retain,
            rest_enabled: true,
        }
    }
}
