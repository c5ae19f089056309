// ── HTTP surface ──
//
// GET  /api/ha/stream  push stream (SSE)
// POST /api/ha         request proxy
// GET  /api/ha/ws      connection info for consumers
// GET  /healthz        upstream connection state

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_core::Stream;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use homelink_api::RestClient;
use homelink_core::{BridgeMessage, ConnectionState, CoreError, EntityState, Session};

use crate::proxy;
use crate::relay::{Relay, error_text};

// ── State ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    session: Session,
    relay: Relay,
    rest: RestClient,
    keepalive: Duration,
}

impl AppState {
    pub fn new(session: Session, relay: Relay, rest: RestClient, keepalive: Duration) -> Self {
        Self {
            inner: Arc::new(AppInner {
                session,
                relay,
                rest,
                keepalive,
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn relay(&self) -> &Relay {
        &self.inner.relay
    }

    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ha", post(proxy::handle))
        .route("/api/ha/stream", get(stream))
        .route("/api/ha/ws", get(connection_info))
        .route("/healthz", get(health))
        .with_state(state)
}

// ── Push stream ──────────────────────────────────────────────────

/// The full cached state list as `result{id:0}`, the shape of a bulk
/// answer. `None` unless the upstream is authenticated.
fn snapshot(session: &Session) -> Option<BridgeMessage> {
    if session.state() != ConnectionState::Authenticated {
        return None;
    }
    let states: Vec<EntityState> = session
        .entities()
        .iter()
        .map(|entity| EntityState::from(entity.as_ref()))
        .collect();
    match serde_json::to_value(states) {
        Ok(list) => Some(BridgeMessage::Result {
            id: 0,
            success: true,
            result: Some(list),
        }),
        Err(e) => {
            warn!(error = %e, "could not encode state snapshot");
            None
        }
    }
}

/// What a listener sees before live events: the connection state and, if
/// connected, the full cached state list.
fn prelude(session: &Session) -> Vec<BridgeMessage> {
    if session.state() == ConnectionState::Authenticated {
        return std::iter::once(BridgeMessage::Connected)
            .chain(snapshot(session))
            .collect();
    }
    match session.last_error() {
        Some(err @ CoreError::AuthenticationFailed { .. }) => vec![BridgeMessage::Error {
            error: error_text(&err),
        }],
        _ => Vec::new(),
    }
}

async fn stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before taking the snapshot so nothing falls in between.
    let live = state.relay().subscribe();
    let prelude = prelude(state.session());
    debug!(
        listeners = state.relay().listener_count(),
        "push-stream listener joined"
    );

    // Skipped changes are lost to this listener; a fresh full list
    // brings its view back in line.
    let session = state.session().clone();
    let live = BroadcastStream::new(live).filter_map(move |message| match message {
        Ok(message) => Some(message),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "push-stream listener lagged, resending snapshot");
            snapshot(&session)
        }
    });

    let events = tokio_stream::iter(prelude)
        .chain(live)
        .map(|message| Ok(Event::default().data(message.to_json())));

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.inner.keepalive))
}

// ── Info endpoints ───────────────────────────────────────────────

async fn connection_info(State(state): State<AppState>) -> Json<Value> {
    let session = state.session();
    Json(json!({
        "wsUrl": session.websocket_url().as_str(),
        "restUrl": session.config().url.as_str().trim_end_matches('/'),
        "useProxy": true,
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let session = state.session();
    Json(json!({
        "status": "ok",
        "upstream": session.state().to_string(),
        "entities": session.entities().len(),
        "listeners": state.relay().listener_count(),
    }))
}
