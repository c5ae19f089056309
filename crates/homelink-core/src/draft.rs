// ── Draft-value overlay ──
//
// Optimistic attribute values shown while a service call is in flight
// (a slider being dragged, a toggle just flipped). Drafts shadow the cache
// in `Session::view` and never write to it; they are cleared when the call
// settles or when their TTL runs out, after which reads see the
// authoritative snapshot again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::model::{Entity, EntityId};

/// Optimistic values for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftValue {
    /// Replaces the cached `state` while the draft is live.
    pub state: Option<String>,
    /// Laid over the cached attributes key by key.
    pub attributes: Map<String, Value>,
}

impl DraftValue {
    pub fn attributes(attributes: Map<String, Value>) -> Self {
        Self {
            state: None,
            attributes,
        }
    }
}

/// Identifies one installed draft, so settling an older call cannot clear
/// a newer draft for the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftToken(u64);

#[derive(Debug)]
struct Draft {
    token: DraftToken,
    state: Option<String>,
    attributes: Map<String, Value>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct DraftOverlay {
    drafts: DashMap<EntityId, Draft>,
    next_token: AtomicU64,
    ttl: Duration,
}

impl DraftOverlay {
    pub fn new(ttl: Duration) -> Self {
        Self {
            drafts: DashMap::new(),
            next_token: AtomicU64::new(1),
            ttl,
        }
    }

    /// Install a draft for `id`, replacing any earlier one.
    pub fn set(&self, id: EntityId, value: DraftValue) -> DraftToken {
        let token = DraftToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.drafts.insert(
            id,
            Draft {
                token,
                state: value.state,
                attributes: value.attributes,
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Remove the draft for `id` if it is still the one `token` installed.
    pub fn clear(&self, id: &EntityId, token: DraftToken) -> bool {
        self.drafts.remove_if(id, |_, d| d.token == token).is_some()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.live(id).is_some()
    }

    /// Lay the live draft for `entity` over it. Returns the entity itself
    /// when there is no draft.
    pub fn overlay(&self, entity: &Arc<Entity>) -> Arc<Entity> {
        let Some((state, attributes)) = self.live(&entity.id) else {
            return Arc::clone(entity);
        };

        let mut view = Entity::clone(entity);
        if let Some(state) = state {
            view.state = state;
        }
        view.attributes.extend(attributes);
        Arc::new(view)
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// The draft for `id`, dropping it first if it has expired.
    fn live(&self, id: &EntityId) -> Option<(Option<String>, Map<String, Value>)> {
        let now = Instant::now();
        let expired = {
            let draft = self.drafts.get(id)?;
            if draft.expires_at > now {
                return Some((draft.state.clone(), draft.attributes.clone()));
            }
            draft.token
        };
        self.clear(id, expired);
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn kitchen() -> Arc<Entity> {
        let attributes = serde_json::from_value(json!({ "brightness": 100, "friendly_name": "Kitchen" })).unwrap();
        Arc::new(Entity {
            id: EntityId::new("light.kitchen").unwrap(),
            state: "off".into(),
            attributes,
            last_changed: Utc::now(),
            last_updated: Utc::now(),
        })
    }

    fn attrs(value: serde_json::Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn draft_shadows_cache_without_touching_it() {
        let overlay = DraftOverlay::new(Duration::from_secs(10));
        let entity = kitchen();

        overlay.set(
            entity.id.clone(),
            DraftValue {
                state: Some("on".into()),
                attributes: attrs(json!({ "brightness": 200 })),
            },
        );
        let view = overlay.overlay(&entity);

        assert_eq!(view.state, "on");
        assert_eq!(view.attributes["brightness"], 200);
        assert_eq!(view.attributes["friendly_name"], "Kitchen");
        assert_eq!(entity.attributes["brightness"], 100);
    }

    #[test]
    fn stale_token_does_not_clear_newer_draft() {
        let overlay = DraftOverlay::new(Duration::from_secs(10));
        let id = kitchen().id.clone();

        let first = overlay.set(id.clone(), DraftValue::attributes(attrs(json!({ "brightness": 150 }))));
        let second = overlay.set(id.clone(), DraftValue::attributes(attrs(json!({ "brightness": 180 }))));

        assert!(!overlay.clear(&id, first));
        assert!(overlay.contains(&id));
        assert!(overlay.clear(&id, second));
        assert!(overlay.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn draft_expires_after_ttl() {
        let overlay = DraftOverlay::new(Duration::from_secs(10));
        let entity = kitchen();
        overlay.set(entity.id.clone(), DraftValue::attributes(attrs(json!({ "brightness": 200 }))));

        tokio::time::advance(Duration::from_secs(11)).await;

        let view = overlay.overlay(&entity);
        assert_eq!(view.attributes["brightness"], 100);
        assert!(overlay.is_empty());
    }
}
