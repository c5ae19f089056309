// ── Entity cache ──
//
// Concurrent storage with O(1) lookups, whole-snapshot replacement and
// push-based change notification. Readers get `Arc` snapshots, so they see
// either the value before an apply or the value after it, never a mix.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

use super::subscribers::{Listener, SubscriberRegistry, Subscription};
use crate::config::Eviction;
use crate::model::{Entity, EntityId};
use crate::stream::EntityStream;

/// Sorted list of every cached entity.
pub type Snapshot = Arc<Vec<Arc<Entity>>>;

/// Local replica of the backend's entity states.
///
/// `apply` is the only way a single entity changes. Each apply replaces
/// the whole record, rebuilds the snapshot watched by
/// [`subscribe_all`](Self::subscribe_all) streams, then notifies the
/// listeners registered for that id.
pub struct EntityCache {
    entities: DashMap<EntityId, Arc<Entity>>,
    subscribers: SubscriberRegistry,
    snapshot: watch::Sender<Snapshot>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entities: DashMap::new(),
            subscribers: SubscriberRegistry::new(),
            snapshot,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace one entity and notify its listeners.
    pub fn apply(&self, entity: Entity) -> Arc<Entity> {
        let entity = Arc::new(entity);
        self.entities
            .insert(entity.id.clone(), Arc::clone(&entity));
        self.rebuild_snapshot();
        trace!(entity_id = %entity.id, state = %entity.state, "entity applied");
        self.subscribers.notify(&entity);
        entity
    }

    /// Apply a full-state list. Returns the number of entities applied.
    ///
    /// Every entry is replaced whole and its listeners notified once. With
    /// [`Eviction::Prune`] keys absent from the list are removed afterwards.
    pub fn apply_bulk(&self, entities: Vec<Entity>, eviction: Eviction) -> usize {
        let applied: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();

        for entity in &applied {
            self.entities
                .insert(entity.id.clone(), Arc::clone(entity));
        }

        if eviction == Eviction::Prune {
            let keep: HashSet<&EntityId> = applied.iter().map(|e| &e.id).collect();
            self.entities.retain(|id, _| keep.contains(id));
        }

        self.rebuild_snapshot();
        trace!(count = applied.len(), %eviction, "bulk applied");

        for entity in &applied {
            self.subscribers.notify(entity);
        }
        applied.len()
    }

    /// Drop one entity. Listeners are not notified.
    pub fn remove(&self, id: &EntityId) -> Option<Arc<Entity>> {
        let removed = self.entities.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub fn clear(&self) {
        self.entities.clear();
        self.rebuild_snapshot();
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.entities.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register a listener for one entity.
    ///
    /// If the entity is already cached the listener is invoked right away
    /// with the current snapshot, before this returns.
    pub fn subscribe<F>(&self, id: EntityId, listener: F) -> Subscription
    where
        F: Fn(&Arc<Entity>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let subscription = self.subscribers.register(id.clone(), Arc::clone(&listener));
        if let Some(current) = self.get(&id) {
            listener(&current);
        }
        subscription
    }

    /// Watch the whole cache.
    pub fn subscribe_all(&self) -> EntityStream {
        EntityStream::new(self.snapshot.subscribe())
    }

    pub fn listener_count(&self, id: &EntityId) -> usize {
        self.subscribers.count(id)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Entity>> =
            self.entities.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
