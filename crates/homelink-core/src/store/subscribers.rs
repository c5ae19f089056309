// ── Per-entity subscriber registry ──
//
// Listeners are keyed by entity id. Notification clones the listener list
// out of the map before invoking anything, so a listener may read the
// cache, subscribe, or drop its own `Subscription` without deadlocking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::model::{Entity, EntityId};

/// Callback invoked with the new snapshot after every apply to its entity.
pub type Listener = Arc<dyn Fn(&Arc<Entity>) + Send + Sync>;

type Slots = DashMap<EntityId, Vec<(u64, Listener)>>;

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    slots: Arc<Slots>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, entity_id: EntityId, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .entry(entity_id.clone())
            .or_default()
            .push((id, listener));

        Subscription {
            entity_id,
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Invoke every listener for `entity` exactly once.
    pub(crate) fn notify(&self, entity: &Arc<Entity>) {
        let listeners: Vec<Listener> = match self.slots.get(&entity.id) {
            Some(slot) => slot.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        for listener in listeners {
            listener(entity);
        }
    }

    pub(crate) fn count(&self, entity_id: &EntityId) -> usize {
        self.slots.get(entity_id).map_or(0, |slot| slot.len())
    }
}

// ── Subscription ────────────────────────────────────────────────────

/// Handle for one registered listener.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) removes
/// that listener only; other listeners on the same entity are untouched.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    entity_id: EntityId,
    id: u64,
    slots: Weak<Slots>,
}

impl Subscription {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        let now_empty = match slots.get_mut(&self.entity_id) {
            Some(mut slot) => {
                slot.retain(|(id, _)| *id != self.id);
                slot.is_empty()
            }
            None => false,
        };
        if now_empty {
            slots.remove_if(&self.entity_id, |_, slot| slot.is_empty());
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("entity_id", &self.entity_id)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
