//! Relay between one upstream Home Assistant session and many consumers.
//!
//! - **Push stream** (`GET /api/ha/stream`): every session event is
//!   republished as a server-sent event (`data: <json>\n\n`). Listeners
//!   that join while the upstream is connected first receive `connected`
//!   and the full cached state list.
//! - **Request proxy** (`POST /api/ha`): `{type, ...params}` forwarded to
//!   the backend's REST API, for consumers that cannot hold a stream open.
//! - **Info** (`GET /api/ha/ws`, `GET /healthz`).
//!
//! [`serve`] wires it all up from a [`BridgeConfig`].

pub mod config;
pub mod error;
pub mod proxy;
pub mod relay;
pub mod routes;
mod server;

pub use config::BridgeConfig;
pub use error::{BridgeError, ProxyError};
pub use proxy::ProxyRequest;
pub use relay::Relay;
pub use routes::{AppState, build_router};
pub use server::serve;
