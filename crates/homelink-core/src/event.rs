// ── Session events ──

use serde_json::Value;

use homelink_api::protocol::StateChanged;

use crate::error::CoreError;

/// Broadcast by a [`Session`](crate::Session) to every event receiver.
///
/// State changes and results are republished in receipt order for the
/// current connection; nothing is promised across a reconnect.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A connection instance completed the handshake.
    Connected,
    /// A `state_changed` event. `new_state` is `None` when the entity was
    /// removed upstream.
    StateChanged(StateChanged),
    /// A `result` frame, correlated or not.
    Result {
        id: u64,
        success: bool,
        result: Option<Value>,
    },
    /// A transport failure, or the fatal authentication rejection.
    Error(CoreError),
    /// The current connection instance went away.
    Disconnected { reason: String },
}
