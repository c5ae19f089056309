// ── Connection instance ──
//
// One WebSocket connection from open to teardown, run as a single task.
// Socket frames, submitted commands, correlation deadlines and the
// keep-alive timer are all handled one at a time by a biased `select!`, so
// a turn (including subscriber notification) always completes before the
// next begins. The correlation table lives on this task's stack and dies
// with it.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use homelink_api::protocol::encode_auth;
use homelink_api::{AccessToken, Command, SocketHandle, SocketSignal};

use crate::correlation::{CorrelationTable, Responder};
use crate::dispatch::{Dispatcher, Routed};
use crate::error::CoreError;
use crate::event::SessionEvent;
use crate::store::FencedWriter;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Authenticated,
    /// Terminal after an authentication rejection.
    Closing,
}

// ── Command envelope ─────────────────────────────────────────────

/// A command submitted to the current instance.
/// Carries its own deadline and a oneshot for the outcome.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub timeout: Duration,
    pub response_tx: Responder,
}

/// Why an instance ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InstanceExit {
    /// The session is shutting down.
    Cancelled,
    /// `auth_invalid`. The session must not reconnect.
    AuthRejected { message: String },
    /// The socket closed or failed.
    Closed { reason: String },
}

// ── Instance ─────────────────────────────────────────────────────

pub(crate) struct Instance {
    pub url: Url,
    pub token: AccessToken,
    pub keepalive: Duration,
    pub dispatcher: Dispatcher,
    pub writer: FencedWriter,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub events: broadcast::Sender<SessionEvent>,
    pub cancel: CancellationToken,
}

impl Instance {
    #[allow(clippy::too_many_lines)]
    pub(crate) async fn run(self, mut commands: mpsc::Receiver<CommandEnvelope>) -> InstanceExit {
        let epoch = self.writer.epoch();
        self.set_state(ConnectionState::Connecting);

        let (socket, mut signals) = SocketHandle::open(self.url.clone(), self.cancel.child_token());
        let mut table = CorrelationTable::new();
        let mut authenticated = false;
        let mut keepalive: Option<Interval> = None;

        let exit = loop {
            let deadline = table.next_deadline();

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    break InstanceExit::Cancelled;
                }

                signal = signals.recv() => match signal {
                    Some(SocketSignal::Open) => {
                        debug!(epoch, "socket open, awaiting auth");
                        self.set_state(ConnectionState::AwaitingAuth);
                    }
                    Some(SocketSignal::Message(text)) => match self.dispatcher.dispatch(&text) {
                        Routed::AuthRequired => {
                            if let Err(e) = socket.send(encode_auth(&self.token)) {
                                warn!(error = %e, "failed to send auth frame");
                            }
                        }
                        Routed::AuthOk { ha_version } => {
                            info!(epoch, ?ha_version, "authenticated");
                            authenticated = true;
                            self.set_state(ConnectionState::Authenticated);

                            send_untracked(&socket, &mut table, &Command::subscribe_state_changes());
                            send_untracked(&socket, &mut table, &Command::GetStates);
                            let _ = self.events.send(SessionEvent::Connected);

                            let mut interval = tokio::time::interval_at(
                                Instant::now() + self.keepalive,
                                self.keepalive,
                            );
                            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            keepalive = Some(interval);
                        }
                        Routed::AuthInvalid { message } => {
                            warn!(epoch, %message, "authentication rejected");
                            self.set_state(ConnectionState::Closing);
                            break InstanceExit::AuthRejected { message };
                        }
                        Routed::Reply { id, outcome } => {
                            if !table.resolve(id, outcome) {
                                debug!(id, "reply without a waiting request");
                            }
                        }
                        Routed::Done => {}
                    },
                    Some(SocketSignal::Error(reason)) => {
                        warn!(epoch, %reason, "socket error");
                        let _ = self.events.send(SessionEvent::Error(CoreError::ConnectionFailed {
                            url: self.url.to_string(),
                            reason,
                        }));
                    }
                    Some(SocketSignal::Closed { code, reason }) => {
                        info!(epoch, ?code, %reason, "socket closed");
                        break InstanceExit::Closed { reason };
                    }
                    None => {
                        break InstanceExit::Closed {
                            reason: "socket task ended".into(),
                        };
                    }
                },

                Some(envelope) = commands.recv(), if authenticated => {
                    submit(&socket, &mut table, envelope);
                }

                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let expired = table.expire(Instant::now());
                    debug!(epoch, expired, pending = table.len(), "correlation deadlines passed");
                }

                () = tick(&mut keepalive) => {
                    let id = table.allocate();
                    match Command::Ping.encode(id).map(|frame| socket.send(frame)) {
                        Ok(Ok(())) => table.register(id, "ping", self.keepalive, None),
                        Ok(Err(e)) | Err(e) => warn!(error = %e, "keep-alive ping not sent"),
                    }
                }
            }
        };

        // ── Teardown ──
        drop(keepalive);
        socket.close();
        let rejected = table.reject_all(&CoreError::ConnectionClosed);
        if rejected > 0 {
            debug!(epoch, rejected, "rejected pending requests on teardown");
        }
        // Anything still queued never reached the socket.
        commands.close();
        while let Ok(envelope) = commands.try_recv() {
            let _ = envelope.response_tx.send(Err(CoreError::ConnectionClosed));
        }

        exit
    }

    /// Publish a state change, unless this instance has been superseded.
    fn set_state(&self, state: ConnectionState) {
        if self.writer.is_current() {
            self.state.send_replace(state);
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Send a command whose reply nobody awaits (the handshake follow-ups).
/// It still consumes an id so ids stay unique.
fn send_untracked(socket: &SocketHandle, table: &mut CorrelationTable, command: &Command) {
    let id = table.allocate();
    match command.encode(id).map(|frame| socket.send(frame)) {
        Ok(Ok(())) => debug!(id, kind = command.kind(), "sent"),
        Ok(Err(e)) | Err(e) => warn!(id, kind = command.kind(), error = %e, "send failed"),
    }
}

/// Allocate an id, write the frame, and track it until reply or deadline.
fn submit(socket: &SocketHandle, table: &mut CorrelationTable, envelope: CommandEnvelope) {
    let CommandEnvelope {
        command,
        timeout,
        response_tx,
    } = envelope;

    let id = table.allocate();
    let frame = match command.encode(id) {
        Ok(frame) => frame,
        Err(e) => {
            let _ = response_tx.send(Err(CoreError::from(e)));
            return;
        }
    };
    if let Err(e) = socket.send(frame) {
        let _ = response_tx.send(Err(CoreError::from(e)));
        return;
    }
    debug!(id, kind = command.kind(), "submitted");
    table.register(id, command.kind(), timeout, Some(response_tx));
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
