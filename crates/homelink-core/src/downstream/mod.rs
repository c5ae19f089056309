// ── Downstream client ──
//
// Consumes a relay (homelink-bridge) rather than the backend: the push
// stream first, the request proxy as a polling fallback once the stream
// is unavailable. Keeps its own entity cache so consumers read the same
// way they read a `Session`.

mod fallback;
mod poll;
mod sse;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use homelink_api::TransportConfig;

pub use fallback::demo_entities;

use crate::config::TlsVerification;
use crate::convert::entity_from_value;
use crate::error::CoreError;
use crate::model::{Entity, EntityId};
use crate::store::{EntityCache, Snapshot, Subscription};
use crate::stream::EntityStream;

/// How the client is currently receiving state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkMode {
    #[default]
    Connecting,
    Streaming,
    Polling,
}

/// Link health as seen by consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub connected: bool,
    pub error: Option<String>,
    pub mode: LinkMode,
}

/// Configuration for a [`BridgeClient`].
#[derive(Debug, Clone)]
pub struct BridgeClientConfig {
    /// Relay base URL (e.g. `http://localhost:3000`).
    pub base_url: Url,
    pub tls: TlsVerification,
    /// Timeout for proxy requests; the push stream has none.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Delay before re-reading a service call's target.
    pub reconcile_delay: Duration,
    /// Dataset shown while the relay is unreachable. Defaults to the last
    /// good snapshot, else [`demo_entities`].
    pub fallback: Option<Vec<Entity>>,
}

impl BridgeClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            reconcile_delay: Duration::from_millis(200),
            fallback: None,
        }
    }
}

// ── BridgeClient ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeClientConfig,
    stream_url: Url,
    proxy_url: Url,
    http: reqwest::Client,
    stream_http: reqwest::Client,
    cache: Arc<EntityCache>,
    status: watch::Sender<LinkStatus>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    pub fn new(config: BridgeClientConfig) -> Result<Self, CoreError> {
        let stream_url = endpoint(&config.base_url, &["api", "ha", "stream"])?;
        let proxy_url = endpoint(&config.base_url, &["api", "ha"])?;

        let transport = TransportConfig {
            tls: config.tls.transport_mode(),
            timeout: Some(config.timeout),
        };
        let http = transport.build_client()?;
        let stream_http = transport.streaming().build_client()?;
        let (status, _) = watch::channel(LinkStatus::default());

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                stream_url,
                proxy_url,
                http,
                stream_http,
                cache: Arc::new(EntityCache::new()),
                status,
                cancel: Mutex::new(CancellationToken::new()),
                task: Mutex::new(None),
            }),
        })
    }

    /// Start consuming in the background. A no-op while already running.
    pub async fn start(&self) {
        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().await = cancel.clone();
        *task = Some(tokio::spawn(run(Arc::clone(&self.inner), cancel)));
    }

    pub async fn stop(&self) {
        self.inner.cancel.lock().await.cancel();
        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        self.inner.status.send_replace(LinkStatus::default());
        debug!("bridge client stopped");
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.inner.status.subscribe()
    }

    // ── Cache access ─────────────────────────────────────────────

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.inner.cache.get(id)
    }

    pub fn entities(&self) -> Snapshot {
        self.inner.cache.snapshot()
    }

    pub fn subscribe<F>(&self, id: EntityId, listener: F) -> Subscription
    where
        F: Fn(&Arc<Entity>) + Send + Sync + 'static,
    {
        self.inner.cache.subscribe(id, listener)
    }

    pub fn subscribe_all(&self) -> EntityStream {
        self.inner.cache.subscribe_all()
    }

    // ── Proxy requests ───────────────────────────────────────────

    /// Invoke a service through the relay, then re-read `target` after the
    /// reconcile delay.
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

        let body = json!({
            "type": "call_service",
            "domain": domain,
            "service": service,
            "service_data": service_data,
        });
        let result = poll::proxy_request(&self.inner.http, &self.inner.proxy_url, &body).await?;

        let client = self.clone();
        let target = target.clone();
        let delay = self.inner.config.reconcile_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = client.refresh(&target).await {
                warn!(entity_id = %target, error = %e, "follow-up refresh failed");
            }
        });

        Ok(result)
    }

    /// Current state of one entity, straight from the relay.
    pub async fn get_state(&self, id: &EntityId) -> Result<Entity, CoreError> {
        let body = json!({ "type": "get_state", "entity_id": id });
        let value = poll::proxy_request(&self.inner.http, &self.inner.proxy_url, &body).await?;
        entity_from_value(&value)
    }

    pub async fn get_history(&self, id: &EntityId, start: &str, end: &str) -> Result<Value, CoreError> {
        let body = json!({
            "type": "get_history",
            "entity_id": id,
            "start": start,
            "end": end,
        });
        poll::proxy_request(&self.inner.http, &self.inner.proxy_url, &body).await
    }

    async fn refresh(&self, id: &EntityId) -> Result<(), CoreError> {
        let entity = self.get_state(id).await?;
        self.inner.cache.apply(entity);
        debug!(entity_id = %id, "refreshed through proxy");
        Ok(())
    }
}

// ── Background task ──────────────────────────────────────────────

async fn run(inner: Arc<BridgeInner>, cancel: CancellationToken) {
    inner.status.send_replace(LinkStatus::default());

    match sse::consume(&inner.stream_http, &inner.stream_url, &inner.cache, &inner.status, &cancel).await {
        Ok(()) if cancel.is_cancelled() => return,
        Ok(()) => info!("push stream closed, switching to polling"),
        Err(e) => warn!(error = %e, "push stream unavailable, switching to polling"),
    }

    inner.status.send_modify(|s| {
        s.connected = false;
        s.mode = LinkMode::Polling;
    });

    let fallback = || fallback_dataset(&inner);
    let ctx = poll::PollContext {
        http: &inner.http,
        url: &inner.proxy_url,
        interval: inner.config.poll_interval,
        cache: &inner.cache,
        status: &inner.status,
        fallback: &fallback,
    };
    poll::run(ctx, &cancel).await;
}

/// Configured fallback, else what the cache last held, else the demo set.
fn fallback_dataset(inner: &BridgeInner) -> Vec<Entity> {
    if let Some(configured) = &inner.config.fallback {
        return configured.clone();
    }
    let last_good = inner.cache.snapshot();
    if last_good.is_empty() {
        demo_entities()
    } else {
        last_good.iter().map(|e| Entity::clone(e)).collect()
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, CoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| CoreError::Config {
            message: format!("{base} cannot be used as a relay base URL"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
