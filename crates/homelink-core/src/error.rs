// ── Core error types ──
//
// Caller-facing errors from homelink-core. Transport and protocol failures
// from homelink-api are translated at the boundary by the
// `From<homelink_api::Error>` impl; callers never match on reqwest or
// tungstenite errors directly.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// The backend rejected the access token. Fatal: the session stops
    /// and does not reconnect.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The connection instance that owned a request went away before a
    /// reply arrived.
    #[error("Connection closed before a reply arrived")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    // ── Request errors ───────────────────────────────────────────────
    #[error("Request {id} timed out after {timeout_ms}ms")]
    RequestTimeout { id: u64, timeout_ms: u64 },

    /// The backend answered a command with `success: false`.
    #[error("Command rejected by backend ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Service {domain}.{service} did not respond within {timeout_ms}ms")]
    ServiceCallTimeout {
        domain: String,
        service: String,
        timeout_ms: u64,
    },

    #[error("Service call rejected ({code}): {message}")]
    ServiceCallRejected { code: String, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Failed to parse message: {message}")]
    Parse { message: String },

    #[error("Invalid entity id `{id}`: expected `<domain>.<object_id>`")]
    InvalidEntityId { id: String },

    #[error("Entity not found: {id}")]
    EntityNotFound { id: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Fatal errors end the session; nothing is retried after them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. } | Self::Config { .. })
    }

    /// Transient errors are resolved by the reconnection policy or by
    /// simply trying again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. }
            | Self::ConnectionClosed
            | Self::NotConnected
            | Self::RequestTimeout { .. }
            | Self::ServiceCallTimeout { .. } => true,
            Self::Api { status, .. } => status.is_some_and(|s| s >= 500),
            _ => false,
        }
    }

    /// HTTP status carried by this error, if it came from the REST API.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::EntityNotFound { .. } => Some(404),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<homelink_api::Error> for CoreError {
    fn from(err: homelink_api::Error) -> Self {
        use homelink_api::Error as Api;

        match err {
            Api::AuthInvalid { message } => CoreError::AuthenticationFailed { message },
            Api::InvalidToken(reason) => CoreError::Config {
                message: format!("Invalid access token: {reason}"),
            },
            Api::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        url: e.url().map(ToString::to_string).unwrap_or_default(),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { .. } => CoreError::ConnectionClosed,
            Api::Deserialization { message, body: _ } => CoreError::Parse { message },
            Api::Protocol(message) => CoreError::Parse { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_is_fatal() {
        let err = CoreError::from(homelink_api::Error::AuthInvalid {
            message: "Invalid access token or password".into(),
        });
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn closed_socket_is_transient() {
        let err = CoreError::from(homelink_api::Error::WebSocketClosed {
            code: 1006,
            reason: String::new(),
        });
        assert_eq!(err, CoreError::ConnectionClosed);
        assert!(err.is_transient());
    }

    #[test]
    fn http_status_is_preserved() {
        let err = CoreError::from(homelink_api::Error::Http {
            status: 502,
            message: "Bad Gateway".into(),
        });
        assert_eq!(err.status(), Some(502));
        assert!(err.is_transient());
    }

    #[test]
    fn timeouts_are_transient_not_fatal() {
        let err = CoreError::RequestTimeout {
            id: 4,
            timeout_ms: 10_000,
        };
        assert!(err.is_transient());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Request 4 timed out after 10000ms");
    }
}
