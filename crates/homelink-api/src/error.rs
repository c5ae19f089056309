use thiserror::Error;

/// Top-level error type for the `homelink-api` crate.
///
/// Covers every failure mode across both API surfaces:
/// authentication, HTTP transport, the REST API, and the WebSocket stream.
/// `homelink-core` maps these into caller-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The backend answered the handshake with `auth_invalid`.
    #[error("Authentication rejected: {message}")]
    AuthInvalid { message: String },

    /// The access token could not be turned into a request header.
    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Non-success status from the backend REST API.
    #[error("Upstream API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A frame that is valid JSON but violates the message protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_5xx_is_transient() {
        let err = Error::Http {
            status: 502,
            message: "Bad Gateway".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn http_404_is_not_found_and_not_transient() {
        let err = Error::Http {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn auth_rejection_is_not_transient() {
        let err = Error::AuthInvalid {
            message: "Invalid access token or password".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status(), None);
    }
}
