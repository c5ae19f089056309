// ── Session → push-stream relay ──
//
// One task reads the session's event channel and republishes every event
// as a `BridgeMessage` on a broadcast channel. Each push-stream listener
// holds its own receiver, so a slow listener lags alone.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use homelink_core::{BridgeMessage, CoreError, Session, SessionEvent};

#[derive(Clone)]
pub struct Relay {
    tx: broadcast::Sender<BridgeMessage>,
}

impl Relay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Start forwarding `session`'s events until `cancel` fires.
    pub fn spawn(&self, session: &Session, cancel: CancellationToken) -> JoinHandle<()> {
        let events = session.events();
        let relay = self.clone();
        tokio::spawn(async move { relay.run(events, cancel).await })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeMessage> {
        self.tx.subscribe()
    }

    /// Send to every current listener. Returns how many received it.
    pub fn publish(&self, message: BridgeMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    async fn run(&self, mut events: broadcast::Receiver<SessionEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => {
                    if let Some(message) = to_bridge_message(event) {
                        let listeners = self.publish(message);
                        trace!(listeners, "relayed event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay fell behind the session");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("relay stopped");
    }
}

/// How a session event looks on the push stream. Disconnects are not
/// forwarded; listeners keep their stream across upstream reconnects.
pub fn to_bridge_message(event: SessionEvent) -> Option<BridgeMessage> {
    match event {
        SessionEvent::Connected => Some(BridgeMessage::Connected),
        SessionEvent::StateChanged(change) => Some(BridgeMessage::from(change)),
        SessionEvent::Result { id, success, result } => Some(BridgeMessage::Result { id, success, result }),
        SessionEvent::Error(err) => Some(BridgeMessage::Error {
            error: error_text(&err),
        }),
        SessionEvent::Disconnected { .. } => None,
    }
}

pub(crate) fn error_text(err: &CoreError) -> String {
    match err {
        CoreError::AuthenticationFailed { .. } => "Authentication failed".into(),
        other => other.to_string(),
    }
}
