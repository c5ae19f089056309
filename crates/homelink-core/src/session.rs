// ── Session ──
//
// Full lifecycle management for one upstream connection: a supervisor task
// opens connection instances one after another, applies the fixed-delay
// reconnection policy, and stops for good on an authentication rejection.
// The entity cache belongs to the session and survives reconnects; every
// instance gets a fresh correlation table and id counter.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use homelink_api::TransportConfig;
use homelink_api::websocket::websocket_url;
use homelink_api::{Command, RestClient};

use crate::config::SessionConfig;
use crate::connection::{CommandEnvelope, ConnectionState, Instance, InstanceExit};
use crate::convert::entity_from_value;
use crate::dispatch::Dispatcher;
use crate::draft::DraftOverlay;
use crate::error::CoreError;
use crate::event::SessionEvent;
use crate::model::{Entity, EntityId};
use crate::store::{EntityCache, Epoch, Snapshot, Subscription};
use crate::stream::EntityStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

// ── Session ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Call
/// [`connect()`](Self::connect) to start the connection supervisor.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    ws_url: Url,
    pub(crate) cache: Arc<EntityCache>,
    pub(crate) drafts: DraftOverlay,
    pub(crate) epoch: Epoch,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<SessionEvent>,
    last_error: watch::Sender<Option<CoreError>>,
    /// Submission side of the current instance's command queue.
    commands: Mutex<Option<mpsc::Sender<CommandEnvelope>>>,
    pub(crate) rest: Option<RestClient>,
    cancel: CancellationToken,
    /// Child token for the running supervisor; replaced on each connect.
    cancel_child: Mutex<CancellationToken>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session. Does NOT connect.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let ws_url = match &config.websocket_url {
            Some(url) => url.clone(),
            None => websocket_url(&config.url).map_err(|e| CoreError::Config {
                message: e.to_string(),
            })?,
        };

        let rest = if config.rest_enabled {
            Some(RestClient::new(
                config.url.clone(),
                &config.token,
                &build_transport(&config),
            )?)
        } else {
            None
        };

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (last_error, _) = watch::channel(None);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(SessionInner {
                drafts: DraftOverlay::new(config.draft_ttl),
                config,
                ws_url,
                cache: Arc::new(EntityCache::new()),
                epoch: Epoch::new(),
                state: Arc::new(state),
                events,
                last_error,
                commands: Mutex::new(None),
                rest,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                supervisor: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The WebSocket endpoint this session connects to.
    pub fn websocket_url(&self) -> &Url {
        &self.inner.ws_url
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start the connection supervisor and wait for the first outcome.
    ///
    /// Returns `Ok` once authenticated. An authentication rejection is
    /// returned as [`CoreError::AuthenticationFailed`] and nothing is
    /// retried. A transport failure is returned as
    /// [`CoreError::ConnectionFailed`] while the supervisor keeps retrying
    /// in the background.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut events = self.inner.events.subscribe();

        {
            let mut supervisor = self.inner.supervisor.lock().await;
            let running = supervisor.as_ref().is_some_and(|h| !h.is_finished());
            if running && self.state() == ConnectionState::Authenticated {
                return Ok(());
            }
            if !running {
                let child = self.inner.cancel.child_token();
                *self.inner.cancel_child.lock().await = child.clone();
                self.inner.last_error.send_replace(None);
                *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.inner), child)));
            }
        }

        let url = self.inner.ws_url.to_string();
        let first_outcome = async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Connected) => return Ok(()),
                    Ok(SessionEvent::Error(e)) if e.is_fatal() => return Err(e),
                    Ok(SessionEvent::Disconnected { reason }) => {
                        return Err(CoreError::ConnectionFailed {
                            url: url.clone(),
                            reason,
                        });
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        return Err(CoreError::Internal("session event channel closed".into()));
                    }
                }
            }
        };

        match tokio::time::timeout(self.inner.config.connect_timeout, first_outcome).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CoreError::ConnectionFailed {
                url: url.clone(),
                reason: format!(
                    "no handshake within {}ms",
                    self.inner.config.connect_timeout.as_millis()
                ),
            }),
        }
    }

    /// Stop the supervisor and close the current connection.
    pub async fn disconnect(&self) {
        self.inner.cancel_child.lock().await.cancel();

        if let Some(handle) = self.inner.supervisor.lock().await.take() {
            let _ = handle.await;
        }

        self.inner.state.send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Most recent connection-level error, if any.
    pub fn last_error(&self) -> Option<CoreError> {
        self.inner.last_error.borrow().clone()
    }

    // ── Cache access ─────────────────────────────────────────────

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    /// Cached snapshot, without consulting the backend.
    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.inner.cache.get(id)
    }

    /// Every cached entity, sorted by id.
    pub fn entities(&self) -> Snapshot {
        self.inner.cache.snapshot()
    }

    /// The cached snapshot with any live draft laid over it.
    pub fn view(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.inner
            .cache
            .get(id)
            .map(|entity| self.inner.drafts.overlay(&entity))
    }

    pub fn drafts(&self) -> &DraftOverlay {
        &self.inner.drafts
    }

    /// Cached snapshot, or a fresh `get_states` lookup when the entity is
    /// not cached yet.
    pub async fn get_state(&self, id: &EntityId) -> Result<Arc<Entity>, CoreError> {
        if let Some(entity) = self.inner.cache.get(id) {
            return Ok(entity);
        }

        let list = self
            .request(Command::GetStates, self.inner.config.state_timeout)
            .await?;

        if let Some(entity) = self.inner.cache.get(id) {
            return Ok(entity);
        }

        // The list is applied by the dispatcher; look in the reply too in
        // case this connection was superseded in between.
        list.as_array()
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|e| e.get("entity_id").and_then(Value::as_str) == Some(id.as_str()))
            })
            .map(entity_from_value)
            .transpose()?
            .map(Arc::new)
            .ok_or_else(|| CoreError::EntityNotFound { id: id.to_string() })
    }

    /// Register a listener for one entity. Invoked right away with the
    /// current snapshot if one is cached.
    pub fn subscribe<F>(&self, id: EntityId, listener: F) -> Subscription
    where
        F: Fn(&Arc<Entity>) + Send + Sync + 'static,
    {
        self.inner.cache.subscribe(id, listener)
    }

    pub fn subscribe_all(&self) -> EntityStream {
        self.inner.cache.subscribe_all()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Submit a command to the current connection and wait for its reply.
    ///
    /// Fails immediately with [`CoreError::NotConnected`] unless a
    /// connection is authenticated.
    pub async fn request(&self, command: Command, timeout: Duration) -> Result<Value, CoreError> {
        if self.state() != ConnectionState::Authenticated {
            return Err(CoreError::NotConnected);
        }

        let tx = self
            .inner
            .commands
            .lock()
            .await
            .clone()
            .ok_or(CoreError::NotConnected)?;

        let (response_tx, response_rx) = oneshot::channel();
        tx.send(CommandEnvelope {
            command,
            timeout,
            response_tx,
        })
        .await
        .map_err(|_| CoreError::NotConnected)?;

        response_rx
            .await
            .map_err(|_| CoreError::ConnectionClosed)?
    }
}

// ── Supervisor ───────────────────────────────────────────────────

/// Run connection instances back to back until cancelled or rejected.
async fn supervise(inner: Arc<SessionInner>, cancel: CancellationToken) {
    loop {
        let writer = inner.epoch.writer(Arc::clone(&inner.cache));
        let epoch = writer.epoch();
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        *inner.commands.lock().await = Some(tx);

        let instance = Instance {
            url: inner.ws_url.clone(),
            token: inner.config.token.clone(),
            keepalive: inner.config.keepalive_interval,
            dispatcher: Dispatcher::new(writer.clone(), inner.events.clone(), inner.config.eviction),
            writer,
            state: Arc::clone(&inner.state),
            events: inner.events.clone(),
            cancel: cancel.child_token(),
        };

        debug!(epoch, url = %inner.ws_url, "starting connection instance");
        let exit = match tokio::spawn(instance.run(rx)).await {
            Ok(exit) => exit,
            Err(e) => InstanceExit::Closed {
                reason: format!("connection task failed: {e}"),
            },
        };

        // Retire the instance: no queue, and its writer goes stale.
        *inner.commands.lock().await = None;
        inner.epoch.advance();

        match exit {
            InstanceExit::Cancelled => {
                inner.state.send_replace(ConnectionState::Disconnected);
                break;
            }
            InstanceExit::AuthRejected { message } => {
                let err = CoreError::AuthenticationFailed { message };
                warn!(error = %err, "not reconnecting after authentication failure");
                inner.last_error.send_replace(Some(err.clone()));
                let _ = inner.events.send(SessionEvent::Error(err));
                inner.state.send_replace(ConnectionState::Closing);
                break;
            }
            InstanceExit::Closed { reason } => {
                inner.state.send_replace(ConnectionState::Disconnected);
                inner.last_error.send_replace(Some(CoreError::ConnectionFailed {
                    url: inner.ws_url.to_string(),
                    reason: reason.clone(),
                }));
                let _ = inner.events.send(SessionEvent::Disconnected { reason });

                let delay = inner.config.reconnect_delay;
                info!(?delay, "connection lost, reconnecting");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    debug!("supervisor stopped");
}

// ── Helpers ──────────────────────────────────────────────────────

/// REST transport settings for this session.
fn build_transport(config: &SessionConfig) -> TransportConfig {
    TransportConfig {
        tls: config.tls.transport_mode(),
        timeout: Some(config.timeout),
    }
}
