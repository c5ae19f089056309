use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use homelink_core::CoreError;

/// Failure of one proxy request, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing parameters")]
    MissingParameter { field: &'static str },

    #[error("Unknown request type")]
    UnknownRequestType { kind: Option<String> },

    #[error("Invalid request body")]
    InvalidBody { reason: String },

    #[error("Upstream API error: {message}")]
    Upstream { status: u16, message: String },

    #[error("Internal server error")]
    Internal { reason: String },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter { .. } | Self::UnknownRequestType { .. } | Self::InvalidBody { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<homelink_api::Error> for ProxyError {
    fn from(err: homelink_api::Error) -> Self {
        match err {
            homelink_api::Error::Http { status, message } => Self::Upstream { status, message },
            other => Self::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal { reason } => error!(%reason, "proxy request failed"),
            Self::Upstream { status, message } => warn!(status, %message, "upstream rejected proxy request"),
            Self::MissingParameter { field } => warn!(field, "proxy request missing parameter"),
            Self::UnknownRequestType { kind } => warn!(?kind, "unknown proxy request type"),
            Self::InvalidBody { reason } => warn!(%reason, "unreadable proxy request"),
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Startup and runtime failures of the relay itself.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] homelink_api::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_preserved() {
        let err = ProxyError::from(homelink_api::Error::Http {
            status: 404,
            message: "Not Found".into(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Upstream API error: Not Found");
    }

    #[test]
    fn client_errors_are_bad_requests() {
        let err = ProxyError::MissingParameter { field: "end" };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Missing parameters");
        assert_eq!(
            ProxyError::UnknownRequestType { kind: None }.to_string(),
            "Unknown request type"
        );
    }

    #[test]
    fn transport_failures_are_internal() {
        let err = ProxyError::from(homelink_api::Error::Protocol("boom".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }
}
