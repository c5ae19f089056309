// ── API-to-domain type conversions ──
//
// Bridges the wire `EntityState` into the canonical `Entity` snapshot and
// back. Wire-only bookkeeping (`context`) is dropped on the way in.

use serde_json::Value;
use tracing::debug;

use homelink_api::EntityState;

use crate::error::CoreError;
use crate::model::{Entity, EntityId};

impl TryFrom<EntityState> for Entity {
    type Error = CoreError;

    fn try_from(raw: EntityState) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EntityId::new(raw.entity_id)?,
            state: raw.state,
            attributes: raw.attributes,
            last_changed: raw.last_changed,
            last_updated: raw.last_updated,
        })
    }
}

impl From<&Entity> for EntityState {
    fn from(entity: &Entity) -> Self {
        Self {
            entity_id: entity.id.to_string(),
            state: entity.state.clone(),
            attributes: entity.attributes.clone(),
            last_changed: entity.last_changed,
            last_updated: entity.last_updated,
            context: None,
        }
    }
}

/// Decode one JSON entity, as found in bulk results and event payloads.
pub fn entity_from_value(value: &Value) -> Result<Entity, CoreError> {
    let raw: EntityState =
        serde_json::from_value(value.clone()).map_err(|e| CoreError::Parse {
            message: e.to_string(),
        })?;
    Entity::try_from(raw)
}

/// Decode a bulk entity list, skipping (and logging) malformed entries.
pub fn entities_from_values(values: &[Value]) -> Vec<Entity> {
    values
        .iter()
        .filter_map(|value| match entity_from_value(value) {
            Ok(entity) => Some(entity),
            Err(e) => {
                debug!(error = %e, "skipping malformed entity in bulk result");
                None
            }
        })
        .collect()
}
