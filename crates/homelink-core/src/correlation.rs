// ── Request/response correlation ──
//
// One table per connection instance, owned by that instance's task. Ids
// start at 1 and are never reused within the instance; every entry leaves
// the table exactly once, by reply, by deadline, or by teardown.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CoreError;

pub(crate) type Responder = oneshot::Sender<Result<Value, CoreError>>;

/// An outstanding command awaiting its `result` or `pong`.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub id: u64,
    pub kind: &'static str,
    pub submitted_at: Instant,
    pub deadline: Instant,
    /// `None` for requests the instance issues on its own (keep-alive).
    pub responder: Option<Responder>,
}

impl PendingRequest {
    fn finish(self, outcome: Result<Value, CoreError>) {
        if let Some(responder) = self.responder {
            // The caller may have given up; nothing to do then.
            let _ = responder.send(outcome);
        }
    }
}

#[derive(Debug)]
pub(crate) struct CorrelationTable {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next message id. Used for every outbound command,
    /// tracked or not.
    pub(crate) fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Start tracking `id` with a deadline `timeout` from now.
    pub(crate) fn register(
        &mut self,
        id: u64,
        kind: &'static str,
        timeout: Duration,
        responder: Option<Responder>,
    ) {
        let submitted_at = Instant::now();
        self.pending.insert(
            id,
            PendingRequest {
                id,
                kind,
                submitted_at,
                deadline: submitted_at + timeout,
                responder,
            },
        );
    }

    /// Settle the entry for `id`. Returns `false` if nothing was waiting.
    pub(crate) fn resolve(&mut self, id: u64, outcome: Result<Value, CoreError>) -> bool {
        let Some(entry) = self.pending.remove(&id) else {
            return false;
        };
        debug!(
            id,
            kind = entry.kind,
            elapsed = ?entry.submitted_at.elapsed(),
            ok = outcome.is_ok(),
            "request settled"
        );
        entry.finish(outcome);
        true
    }

    /// Earliest deadline among live entries.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Reject every entry whose deadline has passed. Returns how many.
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .pending
            .values()
            .filter(|p| p.deadline <= now)
            .map(|p| p.id)
            .collect();

        for id in &expired {
            if let Some(entry) = self.pending.remove(id) {
                let waited = entry.deadline.duration_since(entry.submitted_at);
                let timeout_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                if entry.responder.is_none() {
                    warn!(id, kind = entry.kind, timeout_ms, "no reply to internal request");
                }
                entry.finish(Err(CoreError::RequestTimeout {
                    id: *id,
                    timeout_ms,
                }));
            }
        }
        expired.len()
    }

    /// Reject everything. Called once when the instance is torn down.
    pub(crate) fn reject_all(&mut self, error: &CoreError) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            entry.finish(Err(error.clone()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut table = CorrelationTable::new();
        assert_eq!(table.allocate(), 1);
        assert_eq!(table.allocate(), 2);
        assert_eq!(CorrelationTable::new().allocate(), 1);
    }

    #[tokio::test]
    async fn reply_resolves_and_removes() {
        let mut table = CorrelationTable::new();
        let (tx, rx) = oneshot::channel();
        let id = table.allocate();
        table.register(id, "call_service", Duration::from_secs(10), Some(tx));

        assert!(table.resolve(id, Ok(json!({ "context": {} }))));
        assert_eq!(table.len(), 0);
        assert!(rx.await.unwrap().is_ok());

        // A duplicate reply finds nothing.
        assert!(!table.resolve(id, Ok(Value::Null)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_rejects_with_timeout_and_shrinks_table() {
        let mut table = CorrelationTable::new();
        let before = table.len();

        let (tx, rx) = oneshot::channel();
        let id = table.allocate();
        table.register(id, "call_service", Duration::from_secs(10), Some(tx));
        assert_eq!(table.len(), before + 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(table.expire(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(table.expire(Instant::now()), 1);
        assert_eq!(table.len(), before);

        assert_eq!(
            rx.await.unwrap(),
            Err(CoreError::RequestTimeout {
                id,
                timeout_ms: 10_000
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn next_deadline_is_earliest() {
        let mut table = CorrelationTable::new();
        let a = table.allocate();
        table.register(a, "get_states", Duration::from_secs(5), None);
        let b = table.allocate();
        table.register(b, "call_service", Duration::from_secs(2), None);

        let earliest = table.next_deadline().unwrap();
        assert_eq!(earliest, Instant::now() + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn teardown_rejects_everything() {
        let mut table = CorrelationTable::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            let id = table.allocate();
            table.register(id, "get_states", Duration::from_secs(5), Some(tx));
            receivers.push(rx);
        }

        assert_eq!(table.reject_all(&CoreError::ConnectionClosed), 3);
        assert_eq!(table.len(), 0);
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(CoreError::ConnectionClosed));
        }
    }
}
