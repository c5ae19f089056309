//! Message protocol: upstream command frames and the downstream push stream.
//!
//! Upstream frames are JSON objects discriminated by a `type` field. Every
//! outbound command except `auth` carries a per-connection integer `id`;
//! `result` and `pong` replies echo it back.
//!
//! Downstream messages ([`BridgeMessage`]) are what the relay republishes to
//! its push-stream listeners, one JSON object per `data:` line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AccessToken;
use crate::error::Error;
use crate::models::EntityState;

/// Event class carrying entity snapshots.
pub const STATE_CHANGED: &str = "state_changed";

/// Upper bound on raw frame text kept in deserialization errors.
const ERROR_BODY_LIMIT: usize = 512;

// ── Outbound ─────────────────────────────────────────────────────────

/// A command sent to the backend. Serialized with the per-connection
/// message id by [`Command::encode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SubscribeEvents {
        event_type: String,
    },
    GetStates,
    CallService {
        domain: String,
        service: String,
        service_data: Map<String, Value>,
    },
    Ping,
}

impl Command {
    pub fn subscribe_state_changes() -> Self {
        Self::SubscribeEvents {
            event_type: STATE_CHANGED.into(),
        }
    }

    /// The wire `type` of this command, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscribeEvents { .. } => "subscribe_events",
            Self::GetStates => "get_states",
            Self::CallService { .. } => "call_service",
            Self::Ping => "ping",
        }
    }

    /// Serialize as a frame carrying message id `id`.
    pub fn encode(&self, id: u64) -> Result<String, Error> {
        let mut value = serde_json::to_value(self).map_err(|e| Error::Protocol(e.to_string()))?;
        let Value::Object(ref mut obj) = value else {
            return Err(Error::Protocol(format!(
                "command `{}` did not serialize to an object",
                self.kind()
            )));
        };
        obj.insert("id".into(), Value::from(id));
        Ok(value.to_string())
    }
}

/// The handshake frame. The only outbound frame without an `id`.
pub fn encode_auth(token: &AccessToken) -> String {
    serde_json::json!({
        "type": "auth",
        "access_token": token.expose(),
    })
    .to_string()
}

// ── Inbound ──────────────────────────────────────────────────────────

/// Every frame the backend can send, classified by its `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    AuthRequired { ha_version: Option<String> },
    AuthOk { ha_version: Option<String> },
    AuthInvalid { message: String },
    Event { id: Option<u64>, event: EventMessage },
    Result(ResultFrame),
    Pong { id: u64 },
    /// A well-formed frame whose `type` this client does not handle.
    Unknown { kind: String },
}

impl InboundFrame {
    /// Parse one text frame.
    ///
    /// Fails only on malformed JSON or a frame without `type`; unrecognized
    /// types come back as [`InboundFrame::Unknown`].
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|e| deserialization(&e, text))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("frame has no `type` field".into()))?
            .to_owned();

        let frame = match kind.as_str() {
            "auth_required" => Self::AuthRequired {
                ha_version: string_field(&value, "ha_version"),
            },
            "auth_ok" => Self::AuthOk {
                ha_version: string_field(&value, "ha_version"),
            },
            "auth_invalid" => Self::AuthInvalid {
                message: string_field(&value, "message")
                    .unwrap_or_else(|| "Authentication failed".into()),
            },
            "event" => {
                let raw: RawEvent =
                    serde_json::from_value(value).map_err(|e| deserialization(&e, text))?;
                Self::Event {
                    id: raw.id,
                    event: raw.event,
                }
            }
            "result" => {
                Self::Result(serde_json::from_value(value).map_err(|e| deserialization(&e, text))?)
            }
            "pong" => Self::Pong {
                id: value
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::Protocol("pong without `id`".into()))?,
            },
            _ => Self::Unknown { kind },
        };

        Ok(frame)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<u64>,
    event: EventMessage,
}

/// Payload of an `event` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event_type: String,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub time_fired: Option<DateTime<Utc>>,
}

impl EventMessage {
    pub fn is_state_changed(&self) -> bool {
        self.event_type == STATE_CHANGED
    }

    /// Decode `data` as a state change. Only meaningful when
    /// [`is_state_changed`](Self::is_state_changed) is true.
    pub fn state_changed(&self) -> Result<StateChanged, Error> {
        serde_json::from_value(self.data.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: self.data.to_string(),
        })
    }
}

/// `data` of a `state_changed` event. `new_state` is null when the entity
/// was removed upstream, `old_state` is null when it was just created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChanged {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<EntityState>,
    #[serde(default)]
    pub old_state: Option<EntityState>,
}

/// Reply to a specific outbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFrame {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

impl ResultFrame {
    /// The payload as a bulk entity list, if it is an array.
    pub fn entity_list(&self) -> Option<&Vec<Value>> {
        self.result.as_ref().and_then(Value::as_array)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ── Downstream push stream ───────────────────────────────────────────

/// One message of the relay's push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    Connected,
    StateChanged {
        entity_id: String,
        new_state: Option<EntityState>,
        old_state: Option<EntityState>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<Value>,
    },
    Error {
        error: String,
    },
}

impl BridgeMessage {
    pub fn to_json(&self) -> String {
        // Every variant is a plain struct of JSON-representable fields.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","error":"encode"}"#.into())
    }

    /// Render as a complete push-stream frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| deserialization(&e, text))
    }
}

impl From<StateChanged> for BridgeMessage {
    fn from(change: StateChanged) -> Self {
        Self::StateChanged {
            entity_id: change.entity_id,
            new_state: change.new_state,
            old_state: change.old_state,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn deserialization(err: &serde_json::Error, text: &str) -> Error {
    let body = match text.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    };
    Error::Deserialization {
        message: err.to_string(),
        body,
    }
}
