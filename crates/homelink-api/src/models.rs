// Wire-level entity types shared by the WebSocket and REST surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entity's state as the backend serializes it.
///
/// Identical shape on the WebSocket (`get_states` result, `state_changed`
/// event payloads) and the REST API (`/api/states`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// `"<domain>.<object_id>"`, e.g. `"light.kitchen"`.
    pub entity_id: String,

    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    pub last_changed: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,

    /// Backend bookkeeping (`{id, parent_id, user_id}`), carried opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}
