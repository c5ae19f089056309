// ── Request proxy ──
//
// `POST /api/ha` with `{type, ...params}`. Each request type maps onto one
// backend REST call; the backend's JSON answer is passed through as is.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde_json::{Map, Value};
use tracing::debug;

use homelink_api::RestClient;

use crate::error::ProxyError;
use crate::routes::AppState;

/// A validated proxy request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyRequest {
    GetStates,
    GetState {
        entity_id: String,
    },
    CallService {
        domain: String,
        service: String,
        service_data: Map<String, Value>,
    },
    GetHistory {
        entity_id: String,
        start: String,
        end: String,
    },
}

impl ProxyRequest {
    /// Validate a request body. Nothing is sent upstream for a body that
    /// fails here.
    pub fn parse(body: &Value) -> Result<Self, ProxyError> {
        let Some(fields) = body.as_object() else {
            return Err(ProxyError::InvalidBody {
                reason: "expected a JSON object".into(),
            });
        };

        match fields.get("type").and_then(Value::as_str) {
            Some("get_states") => Ok(Self::GetStates),
            Some("get_state") => Ok(Self::GetState {
                entity_id: required(fields, "entity_id")?,
            }),
            Some("call_service") => Ok(Self::CallService {
                domain: required(fields, "domain")?,
                service: required(fields, "service")?,
                service_data: fields
                    .get("service_data")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            }),
            Some("get_history") => Ok(Self::GetHistory {
                entity_id: required(fields, "entity_id")?,
                start: required(fields, "start")?,
                end: required(fields, "end")?,
            }),
            other => Err(ProxyError::UnknownRequestType {
                kind: other.map(str::to_owned),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetStates => "get_states",
            Self::GetState { .. } => "get_state",
            Self::CallService { .. } => "call_service",
            Self::GetHistory { .. } => "get_history",
        }
    }

    /// Forward to the backend and return its JSON answer.
    pub async fn forward(&self, rest: &RestClient) -> Result<Value, ProxyError> {
        let value = match self {
            Self::GetStates => rest.get_json(rest.states_url()).await?,
            Self::GetState { entity_id } => rest.get_json(rest.state_url(entity_id)).await?,
            Self::CallService {
                domain,
                service,
                service_data,
            } => {
                rest.post_json(rest.service_url(domain, service), service_data)
                    .await?
            }
            Self::GetHistory {
                entity_id,
                start,
                end,
            } => {
                rest.get_json(rest.history_url(entity_id, start, end))
                    .await?
            }
        };
        Ok(value)
    }
}

/// Non-empty string field, else `MissingParameter`.
fn required(fields: &Map<String, Value>, field: &'static str) -> Result<String, ProxyError> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or(ProxyError::MissingParameter { field })
}

pub async fn handle(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ProxyError> {
    let body: Value = serde_json::from_slice(&body).map_err(|e| ProxyError::InvalidBody {
        reason: e.to_string(),
    })?;
    let request = ProxyRequest::parse(&body)?;
    debug!(kind = request.kind(), "proxying request");
    Ok(Json(request.forward(state.rest()).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_every_request_type() {
        assert_eq!(
            ProxyRequest::parse(&json!({ "type": "get_states" })).unwrap(),
            ProxyRequest::GetStates
        );
        assert_eq!(
            ProxyRequest::parse(&json!({ "type": "get_state", "entity_id": "sun.sun" })).unwrap(),
            ProxyRequest::GetState {
                entity_id: "sun.sun".into()
            }
        );

        let call = ProxyRequest::parse(&json!({
            "type": "call_service",
            "domain": "light",
            "service": "turn_on",
            "service_data": { "entity_id": "light.kitchen", "brightness_pct": 80 }
        }))
        .unwrap();
        let ProxyRequest::CallService { service_data, .. } = call else {
            panic!("expected call_service");
        };
        assert_eq!(service_data["brightness_pct"], 80);
    }

    #[test]
    fn call_service_data_defaults_to_empty() {
        let call = ProxyRequest::parse(&json!({
            "type": "call_service",
            "domain": "script",
            "service": "goodnight"
        }))
        .unwrap();
        assert_eq!(
            call,
            ProxyRequest::CallService {
                domain: "script".into(),
                service: "goodnight".into(),
                service_data: Map::new(),
            }
        );
    }

    #[test]
    fn history_requires_all_parameters() {
        let err = ProxyRequest::parse(&json!({
            "type": "get_history",
            "entity_id": "sensor.power",
            "start": "2026-02-10T00:00:00Z"
        }))
        .unwrap_err();
        assert!(matches!(err, ProxyError::MissingParameter { field: "end" }));
    }

    #[test]
    fn unknown_or_missing_type_is_rejected() {
        assert!(matches!(
            ProxyRequest::parse(&json!({ "type": "fire_event" })),
            Err(ProxyError::UnknownRequestType { kind: Some(_) })
        ));
        assert!(matches!(
            ProxyRequest::parse(&json!({ "entity_id": "sun.sun" })),
            Err(ProxyError::UnknownRequestType { kind: None })
        ));
        assert!(matches!(
            ProxyRequest::parse(&json!([1, 2])),
            Err(ProxyError::InvalidBody { .. })
        ));
    }
}
