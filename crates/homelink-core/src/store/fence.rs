// ── Connection-instance fencing ──
//
// Every connection instance is stamped with the session epoch current when
// it started. Teardown advances the epoch, turning any writer still held by
// the old instance into a no-op. Writes hold the epoch read lock across the
// check and the cache update, so `advance` waits for in-flight writes and
// nothing from the old instance lands after it returns.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tracing::debug;

use super::cache::EntityCache;
use crate::config::Eviction;
use crate::model::Entity;

/// Monotonic session epoch shared by the session and its writers.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<RwLock<u64>>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    // A plain counter cannot be left half-written, so a poisoned lock is
    // still usable.
    fn read(&self) -> RwLockReadGuard<'_, u64> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> u64 {
        *self.read()
    }

    /// Retire the current epoch. Returns the new one.
    pub fn advance(&self) -> u64 {
        let mut epoch = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        *epoch
    }

    /// A writer bound to the epoch current right now.
    pub fn writer(&self, cache: Arc<EntityCache>) -> FencedWriter {
        FencedWriter {
            epoch: self.current(),
            fence: self.clone(),
            cache,
        }
    }
}

/// Cache write access for one connection instance.
#[derive(Clone)]
pub struct FencedWriter {
    epoch: u64,
    fence: Epoch,
    cache: Arc<EntityCache>,
}

impl FencedWriter {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self) -> bool {
        self.fence.current() == self.epoch
    }

    /// Apply one entity. Returns `false` if this writer is stale.
    pub fn apply(&self, entity: Entity) -> bool {
        let current = self.fence.read();
        if *current != self.epoch {
            debug!(
                epoch = self.epoch,
                current = *current,
                entity_id = %entity.id,
                "dropping write from superseded connection"
            );
            return false;
        }
        self.cache.apply(entity);
        true
    }

    /// Apply a bulk list. Returns `None` if this writer is stale.
    pub fn apply_bulk(&self, entities: Vec<Entity>, eviction: Eviction) -> Option<usize> {
        let current = self.fence.read();
        if *current != self.epoch {
            debug!(
                epoch = self.epoch,
                current = *current,
                count = entities.len(),
                "dropping bulk write from superseded connection"
            );
            return None;
        }
        Some(self.cache.apply_bulk(entities, eviction))
    }
}
