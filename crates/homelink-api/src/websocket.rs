//! WebSocket transport socket.
//!
//! Owns one persistent bidirectional connection to the backend and turns
//! it into an ordered stream of [`SocketSignal`]s: `Open` once the upgrade
//! completes, one `Message` per text frame, `Error` on a transport failure,
//! and exactly one final `Closed`. Outbound text is queued through the
//! [`SocketHandle`].
//!
//! The socket never reconnects on its own; the session's reconnection
//! policy decides when to open a fresh one.
//!
//! # Example
//!
//! ```rust,ignore
//! use homelink_api::websocket::{self, SocketHandle, SocketSignal};
//! use tokio_util::sync::CancellationToken;
//!
//! let url = websocket::websocket_url(&"http://homeassistant.local:8123".parse()?)?;
//! let (handle, mut signals) = SocketHandle::open(url, CancellationToken::new());
//!
//! while let Some(signal) = signals.recv().await {
//!     match signal {
//!         SocketSignal::Message(text) => println!("{text}"),
//!         SocketSignal::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// Path of the backend's WebSocket endpoint, relative to its base URL.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

// ── SocketSignal ─────────────────────────────────────────────────────

/// Lifecycle and data signals emitted by one socket, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSignal {
    Open,
    Message(String),
    Error(String),
    /// Always the last signal. `code` is absent when no close frame arrived.
    Closed { code: Option<u16>, reason: String },
}

// ── SocketHandle ─────────────────────────────────────────────────────

/// Write side of a running socket.
///
/// Dropping the handle closes the connection after queued frames are
/// flushed; [`close`](Self::close) closes it immediately.
#[derive(Debug)]
pub struct SocketHandle {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl SocketHandle {
    /// Spawn the socket task and return its handle and signal receiver.
    ///
    /// Returns immediately; the connection attempt happens in the
    /// background and reports through the signal channel.
    pub fn open(url: Url, cancel: CancellationToken) -> (Self, mpsc::UnboundedReceiver<SocketSignal>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let closed = match run_socket(&url, outbound_rx, &signal_tx, &task_cancel).await {
                Ok(closed) => closed,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket error");
                    let _ = signal_tx.send(SocketSignal::Error(e.to_string()));
                    SocketSignal::Closed {
                        code: None,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = signal_tx.send(closed);
        });

        (
            Self {
                outbound: outbound_tx,
                cancel,
            },
            signal_rx,
        )
    }

    /// Queue a text frame. Fails once the socket task has exited.
    pub fn send(&self, text: String) -> Result<(), Error> {
        self.outbound.send(text).map_err(|_| Error::WebSocketClosed {
            code: 1006,
            reason: "socket is no longer running".into(),
        })
    }

    /// Close the connection now.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Derive the WebSocket endpoint from the backend's HTTP base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`; any path prefix on the base
/// URL (reverse-proxy mounts) is kept.
pub fn websocket_url(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::Protocol(format!("unsupported URL scheme `{other}`")));
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::Protocol(format!("cannot use `{scheme}` with {base}")))?;
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}{WEBSOCKET_PATH}"));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Connect, then pump frames both ways until either side closes.
async fn run_socket(
    url: &Url,
    mut outbound: mpsc::UnboundedReceiver<String>,
    signals: &mpsc::UnboundedSender<SocketSignal>,
    cancel: &CancellationToken,
) -> Result<SocketSignal, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Ok(SocketSignal::Closed {
                code: None,
                reason: "cancelled before open".into(),
            });
        }
        result = tokio_tungstenite::connect_async(url.as_str()) => {
            result.map_err(|e| Error::WebSocketConnect(e.to_string()))?
        }
    };

    tracing::info!("WebSocket connected");
    let _ = signals.send(SocketSignal::Open);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SocketSignal::Closed {
                    code: Some(1000),
                    reason: "closed by client".into(),
                });
            }
            text = outbound.recv() => {
                let Some(text) = text else {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SocketSignal::Closed {
                        code: Some(1000),
                        reason: "handle dropped".into(),
                    });
                };
                write
                    .send(Message::text(text))
                    .await
                    .map_err(|e| Error::WebSocketConnect(format!("write failed: {e}")))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = signals.send(SocketSignal::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong reply automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((None, String::new()), |cf| {
                            (Some(u16::from(cf.code)), cf.reason.as_str().to_owned())
                        });
                        tracing::info!(?code, %reason, "WebSocket close frame received");
                        return Ok(SocketSignal::Closed { code, reason });
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(SocketSignal::Closed {
                            code: None,
                            reason: "stream ended".into(),
                        });
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn http_base_becomes_ws() {
        let base = Url::parse("http://192.168.1.181:8123").unwrap();
        assert_eq!(
            websocket_url(&base).unwrap().as_str(),
            "ws://192.168.1.181:8123/api/websocket"
        );
    }

    #[test]
    fn https_base_becomes_wss_and_keeps_prefix() {
        let base = Url::parse("https://example.org/ha/?x=1").unwrap();
        assert_eq!(
            websocket_url(&base).unwrap().as_str(),
            "wss://example.org/ha/api/websocket"
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let base = Url::parse("ftp://example.org").unwrap();
        assert!(matches!(websocket_url(&base), Err(Error::Protocol(_))));
    }
}
