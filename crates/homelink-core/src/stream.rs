// ── Reactive entity streams ──
//
// Subscription type for consuming whole-cache changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Entity, EntityId};
use crate::store::Snapshot;

/// A subscription to every cached entity.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via the `changed()` method or by converting to a `Stream`.
pub struct EntityStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl EntityStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Look up one entity in the current snapshot.
    pub fn find(&self, id: &EntityId) -> Option<&Arc<Entity>> {
        self.current
            .binary_search_by(|e| e.id.cmp(id))
            .ok()
            .and_then(|idx| self.current.get(idx))
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the cache has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> EntityWatchStream {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one each time the cache
/// is mutated.
pub struct EntityWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for EntityWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use futures_util::StreamExt;
    use serde_json::Map;

    use crate::store::EntityCache;

    use super::*;

    fn entity(id: &str) -> Entity {
        Entity {
            id: EntityId::new(id).unwrap(),
            state: "on".into(),
            attributes: Map::new(),
            last_changed: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn changed_yields_new_snapshot() {
        let cache = EntityCache::new();
        let mut stream = cache.subscribe_all();
        assert!(stream.current().is_empty());

        cache.apply(entity("light.kitchen"));

        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert!(stream.find(&EntityId::new("light.kitchen").unwrap()).is_some());
        assert!(stream.find(&EntityId::new("light.attic").unwrap()).is_none());
    }

    #[tokio::test]
    async fn into_stream_starts_with_current() {
        let cache = EntityCache::new();
        cache.apply(entity("switch.porch"));

        let mut stream = cache.subscribe_all().into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn stream_waits_for_the_next_mutation() {
        let cache = EntityCache::new();
        let mut stream = tokio_test::task::spawn(cache.subscribe_all().into_stream());

        let initial = tokio_test::assert_ready!(stream.poll_next()).unwrap();
        assert!(initial.is_empty());
        tokio_test::assert_pending!(stream.poll_next());

        cache.apply(entity("light.kitchen"));
        assert!(stream.is_woken());
        let next = tokio_test::assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(next.len(), 1);
    }
}
