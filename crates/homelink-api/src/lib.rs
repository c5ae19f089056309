// homelink-api: Async Rust client for the Home Assistant WebSocket and REST APIs

pub mod auth;
pub mod error;
pub mod models;
pub mod protocol;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use auth::AccessToken;
pub use error::Error;
pub use models::EntityState;
pub use protocol::{BridgeMessage, Command, InboundFrame, ResultFrame};
pub use rest::RestClient;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{SocketHandle, SocketSignal};
