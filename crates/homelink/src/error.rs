//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `ConfigError` and `BridgeError` into user-facing
//! errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use homelink_bridge::BridgeError;
use homelink_config::ConfigError;
use homelink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(homelink::connection_failed),
        help(
            "Check that Home Assistant is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the backend was lost")]
    #[diagnostic(
        code(homelink::connection_closed),
        help("The request was dropped with the connection. Try again.")
    )]
    ConnectionClosed,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(homelink::auth_failed),
        help(
            "Check the long-lived access token for profile '{profile}'.\n\
             Tokens are created under your user profile in Home Assistant.\n\
             Store a new one with: homelink config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(homelink::no_credentials),
        help(
            "Pass --token, set HOMELINK_TOKEN, or run:\n\
             homelink config set-token --profile {profile}"
        )
    )]
    NoCredentials { profile: String },

    // ── Entities & services ──────────────────────────────────────────
    #[error("Entity '{entity_id}' not found")]
    #[diagnostic(
        code(homelink::not_found),
        help("Run: homelink states to see available entities")
    )]
    NotFound { entity_id: String },

    #[error("Service call rejected ({code}): {message}")]
    #[diagnostic(code(homelink::service_rejected))]
    ServiceRejected { code: String, message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(homelink::api_error))]
    ApiError {
        message: String,
        status: Option<u16>,
    },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("{what} timed out after {millis}ms")]
    #[diagnostic(
        code(homelink::timeout),
        help("Check backend responsiveness, or raise the timeout in your profile.")
    )]
    Timeout { what: String, millis: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(homelink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(homelink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: homelink config init --name {name} --base-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(homelink::no_config),
        help(
            "Pass --url, or create a profile with: homelink config init --base-url <URL>\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(homelink::config))]
    Config(ConfigError),

    // ── Relay ────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(homelink::relay))]
    Bridge(BridgeError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(homelink::json), help("Service data must be a JSON object."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionClosed => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ServiceRejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } | Self::Json(_) => {
                exit_code::USAGE
            }
            Self::ApiError { status: Some(404), .. } => exit_code::NOT_FOUND,
            Self::ApiError { status: Some(401 | 403), .. } => exit_code::AUTH,
            Self::Bridge(BridgeError::Bind { .. }) => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::ConnectionClosed | CoreError::NotConnected => CliError::ConnectionClosed,

            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::RequestTimeout { id, timeout_ms } => CliError::Timeout {
                what: format!("Request {id}"),
                millis: timeout_ms,
            },

            CoreError::ServiceCallTimeout {
                domain,
                service,
                timeout_ms,
            } => CliError::Timeout {
                what: format!("Service {domain}.{service}"),
                millis: timeout_ms,
            },

            CoreError::Rejected { code, message } | CoreError::ServiceCallRejected { code, message } => {
                CliError::ServiceRejected { code, message }
            }

            CoreError::InvalidEntityId { id } => CliError::Validation {
                field: "entity_id".into(),
                reason: format!("`{id}` is not of the form <domain>.<object_id>"),
            },

            CoreError::EntityNotFound { id } => CliError::NotFound { entity_id: id },

            CoreError::Api { message, status } => CliError::ApiError { message, status },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Parse { message } | CoreError::Internal(message) => CliError::ApiError {
                message,
                status: None,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => CliError::Config(other),
        }
    }
}

impl From<homelink_api::Error> for CliError {
    fn from(err: homelink_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<BridgeError> for CliError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Core(core) => core.into(),
            other => CliError::Bridge(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let auth: CliError = CoreError::AuthenticationFailed {
            message: "Invalid access token".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let timeout: CliError = CoreError::ServiceCallTimeout {
            domain: "light".into(),
            service: "turn_on".into(),
            timeout_ms: 10_000,
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);
        assert_eq!(timeout.to_string(), "Service light.turn_on timed out after 10000ms");

        let missing: CliError = CoreError::EntityNotFound {
            id: "light.attic".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let upstream_404: CliError = CoreError::Api {
            message: "Not Found".into(),
            status: Some(404),
        }
        .into();
        assert_eq!(upstream_404.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn config_errors_keep_their_meaning() {
        let err: CliError = ConfigError::NoCredentials {
            profile: "home".into(),
        }
        .into();
        assert!(matches!(err, CliError::NoCredentials { ref profile } if profile == "home"));
        assert_eq!(err.exit_code(), exit_code::AUTH);

        let err: CliError = ConfigError::UnknownProfile { name: "lab".into() }.into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
