use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use homelink_core::SessionConfig;

/// Everything `serve` needs: where to listen and which backend to relay.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind: SocketAddr,
    pub session: SessionConfig,
    /// Period of the push stream's keep-alive comment.
    pub sse_keepalive: Duration,
    /// Buffered messages per push-stream listener before it lags.
    pub listener_buffer: usize,
}

impl BridgeConfig {
    pub fn new(session: SessionConfig) -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            session,
            sse_keepalive: Duration::from_secs(15),
            listener_buffer: 256,
        }
    }
}
