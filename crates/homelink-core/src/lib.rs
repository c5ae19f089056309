//! Client core between `homelink-api` and its consumers (relay and CLI).
//!
//! This crate owns the connection lifecycle, the entity cache and the
//! service gateway for one Home Assistant instance:
//!
//! - **[`Session`]**: cheaply cloneable handle. [`connect()`](Session::connect)
//!   starts a supervisor that opens connection instances, runs the auth
//!   handshake, subscribes to state changes and reconnects after a fixed
//!   delay. An authentication rejection stops it for good.
//!
//! - **[`EntityCache`]**: `DashMap`-backed latest-snapshot store with
//!   per-entity listeners ([`Subscription`]) and a whole-cache
//!   [`EntityStream`]. Writes from a connection go through a fenced writer
//!   so a superseded connection cannot touch it.
//!
//! - **Service gateway**: [`Session::call_service`] correlates the reply,
//!   maps timeouts and rejections to typed errors, and refreshes the target
//!   entity shortly after. [`DraftOverlay`] holds optimistic values while a
//!   call is in flight.
//!
//! - **[`BridgeClient`]** ([`downstream`]): consumes a relay's push stream
//!   and falls back to polling its request proxy.

pub mod config;
mod connection;
pub mod convert;
mod correlation;
mod dispatch;
pub mod downstream;
pub mod draft;
pub mod error;
pub mod event;
mod gateway;
pub mod model;
pub mod session;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Eviction, SessionConfig, TlsVerification};
pub use connection::ConnectionState;
pub use downstream::{BridgeClient, BridgeClientConfig, LinkMode, LinkStatus};
pub use draft::{DraftOverlay, DraftToken, DraftValue};
pub use error::CoreError;
pub use event::SessionEvent;
pub use model::{Entity, EntityId};
pub use session::Session;
pub use store::{EntityCache, Snapshot, Subscription};
pub use stream::EntityStream;

// The wire-level types consumers need alongside the session.
pub use homelink_api::{AccessToken, BridgeMessage, Command, EntityState};
