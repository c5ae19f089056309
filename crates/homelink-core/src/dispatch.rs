// ── Inbound frame dispatcher ──
//
// Classifies every inbound text frame. Entity data is applied to the cache
// (through the instance's fenced writer) and republished as a session
// event; replies and handshake frames are handed back to the connection
// task, which owns the correlation table and the handshake state.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use homelink_api::InboundFrame;
use homelink_api::protocol::{EventMessage, ResultFrame};

use crate::config::Eviction;
use crate::convert::entities_from_values;
use crate::error::CoreError;
use crate::event::SessionEvent;
use crate::model::Entity;
use crate::store::FencedWriter;

/// What the connection task has to do with a frame after dispatch.
#[derive(Debug, PartialEq)]
pub(crate) enum Routed {
    AuthRequired,
    AuthOk { ha_version: Option<String> },
    AuthInvalid { message: String },
    /// Settle correlation entry `id`.
    Reply {
        id: u64,
        outcome: Result<Value, CoreError>,
    },
    /// Fully handled (or dropped) here.
    Done,
}

pub(crate) struct Dispatcher {
    writer: FencedWriter,
    events: broadcast::Sender<SessionEvent>,
    eviction: Eviction,
}

impl Dispatcher {
    pub(crate) fn new(
        writer: FencedWriter,
        events: broadcast::Sender<SessionEvent>,
        eviction: Eviction,
    ) -> Self {
        Self {
            writer,
            events,
            eviction,
        }
    }

    /// Route one text frame. Never fails: malformed and unknown frames
    /// are logged and dropped.
    pub(crate) fn dispatch(&self, text: &str) -> Routed {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %CoreError::from(e), "dropping unparseable frame");
                return Routed::Done;
            }
        };

        match frame {
            InboundFrame::AuthRequired { ha_version } => {
                debug!(?ha_version, "auth required");
                Routed::AuthRequired
            }
            InboundFrame::AuthOk { ha_version } => Routed::AuthOk { ha_version },
            InboundFrame::AuthInvalid { message } => Routed::AuthInvalid { message },
            InboundFrame::Event { event, .. } => {
                self.on_event(event);
                Routed::Done
            }
            InboundFrame::Result(result) => self.on_result(result),
            InboundFrame::Pong { id } => Routed::Reply {
                id,
                outcome: Ok(Value::Null),
            },
            InboundFrame::Unknown { kind } => {
                debug!(kind, "ignoring frame of unknown type");
                Routed::Done
            }
        }
    }

    fn on_event(&self, event: EventMessage) {
        if !event.is_state_changed() {
            trace!(event_type = %event.event_type, "ignoring event");
            return;
        }

        if !self.writer.is_current() {
            return;
        }

        let change = match event.state_changed() {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, "dropping malformed state_changed event");
                return;
            }
        };

        match change.new_state.clone().map(Entity::try_from) {
            Some(Ok(entity)) => {
                if !self.writer.apply(entity) {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(entity_id = %change.entity_id, error = %e, "dropping state with invalid id");
                return;
            }
            None => debug!(entity_id = %change.entity_id, "entity removed upstream"),
        }

        let _ = self.events.send(SessionEvent::StateChanged(change));
    }

    fn on_result(&self, result: ResultFrame) -> Routed {
        if let Some(list) = result.entity_list() {
            if !self.writer.is_current() {
                return Routed::Done;
            }
            let entities = entities_from_values(list);
            if let Some(count) = self.writer.apply_bulk(entities, self.eviction) {
                debug!(id = result.id, count, "bulk state list applied");
            }
        }

        let _ = self.events.send(SessionEvent::Result {
            id: result.id,
            success: result.success,
            result: result.result.clone(),
        });

        let outcome = if result.success {
            Ok(result.result.unwrap_or(Value::Null))
        } else {
            let (code, message) = result
                .error
                .map(|e| (e.code, e.message))
                .unwrap_or_else(|| ("unknown_error".into(), "Command failed".into()));
            Err(CoreError::Rejected { code, message })
        };

        Routed::Reply {
            id: result.id,
            outcome,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::EntityId;
    use crate::store::{EntityCache, Epoch};

    fn setup() -> (Dispatcher, Arc<EntityCache>, Epoch, broadcast::Receiver<SessionEvent>) {
        let cache = Arc::new(EntityCache::new());
        let epoch = Epoch::new();
        let (events, rx) = broadcast::channel(16);
        let dispatcher = Dispatcher::new(epoch.writer(Arc::clone(&cache)), events, Eviction::Retain);
        (dispatcher, cache, epoch, rx)
    }

    fn state(id: &str, value: &str) -> Value {
        json!({
            "entity_id": id,
            "state": value,
            "attributes": {},
            "last_changed": "2026-02-10T12:00:00Z",
            "last_updated": "2026-02-10T12:00:00Z"
        })
    }

    fn state_changed(id: &str, new_state: Value) -> String {
        json!({
            "id": 1,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": { "entity_id": id, "new_state": new_state, "old_state": null }
            }
        })
        .to_string()
    }

    #[test]
    fn state_changed_updates_cache_and_publishes() {
        let (dispatcher, cache, _epoch, mut rx) = setup();

        let routed = dispatcher.dispatch(&state_changed("light.kitchen", state("light.kitchen", "on")));

        assert_eq!(routed, Routed::Done);
        assert_eq!(cache.get(&EntityId::new("light.kitchen").unwrap()).unwrap().state, "on");
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::StateChanged(c) if c.entity_id == "light.kitchen"));
    }

    #[test]
    fn removal_is_published_without_mutating() {
        let (dispatcher, cache, _epoch, mut rx) = setup();

        dispatcher.dispatch(&state_changed("light.kitchen", Value::Null));

        assert!(cache.is_empty());
        let SessionEvent::StateChanged(change) = rx.try_recv().unwrap() else {
            panic!("expected state change");
        };
        assert!(change.new_state.is_none());
    }

    #[test]
    fn array_result_is_applied_even_without_correlation() {
        let (dispatcher, cache, _epoch, _rx) = setup();
        let frame = json!({
            "id": 2,
            "type": "result",
            "success": true,
            "result": [state("light.kitchen", "on"), state("switch.porch", "off")]
        })
        .to_string();

        let Routed::Reply { id, outcome } = dispatcher.dispatch(&frame) else {
            panic!("expected reply");
        };
        assert_eq!(id, 2);
        assert!(outcome.is_ok());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_result_is_rejected() {
        let (dispatcher, _cache, _epoch, _rx) = setup();
        let frame = r#"{"id":7,"type":"result","success":false,"error":{"code":"service_not_found","message":"Service light.explode not found."}}"#;

        assert_eq!(
            dispatcher.dispatch(frame),
            Routed::Reply {
                id: 7,
                outcome: Err(CoreError::Rejected {
                    code: "service_not_found".into(),
                    message: "Service light.explode not found.".into(),
                }),
            }
        );
    }

    #[test]
    fn stale_dispatcher_does_not_mutate() {
        let (dispatcher, cache, epoch, _rx) = setup();
        epoch.advance();

        dispatcher.dispatch(&state_changed("light.kitchen", state("light.kitchen", "on")));

        assert!(cache.is_empty());
    }

    #[test]
    fn handshake_and_pong_frames_route_back() {
        let (dispatcher, _cache, _epoch, _rx) = setup();
        assert_eq!(dispatcher.dispatch(r#"{"type":"auth_required"}"#), Routed::AuthRequired);
        assert_eq!(
            dispatcher.dispatch(r#"{"type":"auth_invalid","message":"bad"}"#),
            Routed::AuthInvalid { message: "bad".into() }
        );
        assert_eq!(
            dispatcher.dispatch(r#"{"id":12,"type":"pong"}"#),
            Routed::Reply { id: 12, outcome: Ok(Value::Null) }
        );
    }

    #[test]
    fn garbage_and_unknown_frames_are_dropped() {
        let (dispatcher, cache, _epoch, mut rx) = setup();
        assert_eq!(dispatcher.dispatch("{not json"), Routed::Done);
        assert_eq!(dispatcher.dispatch(r#"{"type":"zeroconf"}"#), Routed::Done);
        assert!(cache.is_empty());
        assert!(rx.try_recv().is_err());
    }
}
