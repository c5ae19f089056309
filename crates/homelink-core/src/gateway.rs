// ── Service gateway ──
//
// Turns service invocations into `call_service` commands, maps
// correlation-level failures into service-call errors, and schedules the
// follow-up refresh of the call's target entity.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use homelink_api::Command;

use crate::draft::DraftValue;
use crate::error::CoreError;
use crate::model::{Entity, EntityId};
use crate::session::Session;
use crate::store::FencedWriter;

impl Session {
    /// Invoke `domain.service` on `target`.
    ///
    /// `service_data` is `{entity_id: target, ...data}`; keys in `data`
    /// win. Resolves with the backend's result payload once acknowledged.
    /// On success a refresh of `target` follows after the configured
    /// reconcile delay without blocking the caller.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        target: &EntityId,
        data: Option<Map<String, Value>>,
    ) -> Result<Value, CoreError> {
        let mut service_data = Map::new();
        service_data.insert("entity_id".into(), Value::String(target.to_string()));
        if let Some(data) = data {
            service_data.extend(data);
        }

        info!(domain, service, entity_id = %target, "calling service");

        let command = Command::CallService {
            domain: domain.into(),
            service: service.into(),
            service_data,
        };

        match self.request(command, self.inner.config.service_timeout).await {
            Ok(result) => {
                self.schedule_refresh(target.clone());
                Ok(result)
            }
            Err(CoreError::RequestTimeout { timeout_ms, .. }) => Err(CoreError::ServiceCallTimeout {
                domain: domain.into(),
                service: service.into(),
                timeout_ms,
            }),
            Err(CoreError::Rejected { code, message }) => {
                Err(CoreError::ServiceCallRejected { code, message })
            }
            Err(e) => Err(e),
        }
    }

    /// [`call_service`](Self::call_service) with an optimistic draft.
    ///
    /// `draft` is visible through [`view`](Self::view) while the call is in
    /// flight and cleared when it settles, whatever the outcome.
    pub async fn call_service_with_draft(
        &self,
        domain: &str,
        service: &str,
        target: &EntityId,
        data: Option<Map<String, Value>>,
        draft: DraftValue,
    ) -> Result<Value, CoreError> {
        let token = self.inner.drafts.set(target.clone(), draft);
        let outcome = self.call_service(domain, service, target, data).await;
        self.inner.drafts.clear(target, token);
        outcome
    }

    fn schedule_refresh(&self, target: EntityId) {
        let session = self.clone();
        let delay = self.inner.config.reconcile_delay;
        let writer = self.inner.epoch.writer(Arc::clone(&self.inner.cache));

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = session.refresh_entity(&target, &writer).await {
                warn!(entity_id = %target, error = %e, "follow-up refresh failed");
            }
        });
    }

    /// Fetch the current state of one entity into the cache: over REST when
    /// a client is configured, else via `get_states` on the socket.
    async fn refresh_entity(&self, target: &EntityId, writer: &FencedWriter) -> Result<(), CoreError> {
        if let Some(rest) = &self.inner.rest {
            let state = rest.get_state(target.as_str()).await?;
            let entity = Entity::try_from(state)?;
            if writer.apply(entity) {
                debug!(entity_id = %target, "refreshed over REST");
            }
            return Ok(());
        }

        self.request(Command::GetStates, self.inner.config.state_timeout)
            .await?;
        debug!(entity_id = %target, "refreshed via get_states");
        Ok(())
    }
}
