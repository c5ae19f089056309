#![allow(clippy::unwrap_used, dead_code)]
// In-process stand-in for the backend's WebSocket API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use homelink_core::{AccessToken, Session, SessionConfig};

pub const GOOD_TOKEN: &str = "good-token";

/// How the fake answers `call_service`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Succeed and apply the service to the stored state.
    Ack,
    /// Reply `success: false`.
    Reject,
    /// Never reply.
    Silent,
}

/// One frame the fake received from a client.
#[derive(Debug, Clone)]
pub struct Received {
    /// 1-based index of the connection it arrived on.
    pub connection: usize,
    pub at: Instant,
    pub frame: Value,
}

impl Received {
    pub fn kind(&self) -> &str {
        self.frame["type"].as_str().unwrap_or_default()
    }

    pub fn id(&self) -> Option<u64> {
        self.frame["id"].as_u64()
    }
}

enum Control {
    Push(String),
    Drop,
}

struct Shared {
    mode: ServiceMode,
    states: Mutex<Vec<Value>>,
    received: Mutex<Vec<Received>>,
    connections: AtomicUsize,
}

pub struct FakeBackend {
    pub url: Url,
    shared: Arc<Shared>,
    control: mpsc::UnboundedSender<Control>,
}

impl FakeBackend {
    pub async fn start(mode: ServiceMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse(&format!("ws://{addr}/api/websocket")).unwrap();

        let shared = Arc::new(Shared {
            mode,
            states: Mutex::new(vec![
                state_json("light.kitchen", "off", json!({ "friendly_name": "Kitchen Light" })),
                state_json("sensor.outdoor_temp", "12.5", json!({ "unit_of_measurement": "°C" })),
            ]),
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
        });
        let (control, mut control_rx) = mpsc::unbounded_channel();

        let server_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            // Connections are served one after another, which is all a
            // reconnecting client ever opens.
            while let Ok((stream, _)) = listener.accept().await {
                let index = server_shared.connections.fetch_add(1, Ordering::SeqCst) + 1;
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                serve(ws, index, &server_shared, &mut control_rx).await;
            }
        });

        Self { url, shared, control }
    }

    /// A session pointed at this fake with short test timings and REST off.
    pub fn config(&self, token: &str) -> SessionConfig {
        let mut config = SessionConfig::new("http://127.0.0.1:9".parse().unwrap(), AccessToken::from(token));
        config.websocket_url = Some(self.url.clone());
        config.rest_enabled = false;
        config.connect_timeout = Duration::from_secs(5);
        config.reconnect_delay = Duration::from_millis(100);
        config.service_timeout = Duration::from_millis(300);
        config.state_timeout = Duration::from_millis(500);
        config.reconcile_delay = Duration::from_millis(200);
        config
    }

    pub fn session(&self, token: &str) -> Session {
        Session::new(self.config(token)).unwrap()
    }

    pub fn push(&self, frame: Value) {
        self.control.send(Control::Push(frame.to_string())).unwrap();
    }

    /// Drop the current connection without a close handshake.
    pub fn drop_connection(&self) {
        self.control.send(Control::Drop).unwrap();
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn received_of(&self, kind: &str) -> Vec<Received> {
        self.received().into_iter().filter(|r| r.kind() == kind).collect()
    }
}

async fn serve(
    mut ws: WebSocketStream<TcpStream>,
    index: usize,
    shared: &Shared,
    control: &mut mpsc::UnboundedReceiver<Control>,
) {
    let _ = ws
        .send(Message::text(json!({ "type": "auth_required", "ha_version": "2026.2.0" }).to_string()))
        .await;

    let Some(Ok(Message::Text(auth))) = ws.next().await else {
        return;
    };
    let auth: Value = serde_json::from_str(auth.as_str()).unwrap();
    if auth["access_token"] != GOOD_TOKEN {
        let _ = ws
            .send(Message::text(json!({ "type": "auth_invalid", "message": "Invalid access token" }).to_string()))
            .await;
        let _ = ws.close(None).await;
        return;
    }
    let _ = ws
        .send(Message::text(json!({ "type": "auth_ok", "ha_version": "2026.2.0" }).to_string()))
        .await;

    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(Ok(Message::Text(text))) = frame else {
                    return;
                };
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                shared.received.lock().unwrap().push(Received {
                    connection: index,
                    at: Instant::now(),
                    frame: frame.clone(),
                });
                if let Some(reply) = reply_to(&frame, shared) {
                    let _ = ws.send(Message::text(reply.to_string())).await;
                }
            }
            control = control.recv() => match control {
                Some(Control::Push(text)) => {
                    let _ = ws.send(Message::text(text)).await;
                }
                Some(Control::Drop) | None => return,
            },
        }
    }
}

fn reply_to(frame: &Value, shared: &Shared) -> Option<Value> {
    let id = frame["id"].as_u64()?;
    match frame["type"].as_str()? {
        "subscribe_events" => Some(json!({ "id": id, "type": "result", "success": true, "result": null })),
        "get_states" => {
            let states = shared.states.lock().unwrap().clone();
            Some(json!({ "id": id, "type": "result", "success": true, "result": states }))
        }
        "ping" => Some(json!({ "id": id, "type": "pong" })),
        "call_service" => match shared.mode {
            ServiceMode::Ack => {
                apply_service(frame, shared);
                Some(json!({
                    "id": id,
                    "type": "result",
                    "success": true,
                    "result": { "context": { "id": "01HQCONTEXT" } }
                }))
            }
            ServiceMode::Reject => Some(json!({
                "id": id,
                "type": "result",
                "success": false,
                "error": { "code": "service_not_found", "message": "Service not found" }
            })),
            ServiceMode::Silent => None,
        },
        _ => None,
    }
}

/// `turn_on` / `turn_off` flip the target's stored state and merge the
/// remaining service data into its attributes.
fn apply_service(frame: &Value, shared: &Shared) {
    let new_state = match frame["service"].as_str() {
        Some("turn_on") => "on",
        Some("turn_off") => "off",
        _ => return,
    };
    let target = &frame["service_data"]["entity_id"];
    let mut states = shared.states.lock().unwrap();
    if let Some(entry) = states.iter_mut().find(|s| &s["entity_id"] == target) {
        entry["state"] = json!(new_state);
        if let Some(data) = frame["service_data"].as_object() {
            for (key, value) in data.iter().filter(|(k, _)| *k != "entity_id") {
                entry["attributes"][key] = value.clone();
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn state_json(entity_id: &str, state: &str, attributes: Value) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": attributes,
        "last_changed": "2026-02-10T12:00:00Z",
        "last_updated": "2026-02-10T12:00:00Z",
    })
}

/// Wait up to five seconds for `check` to hold.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
