// ── Request proxy client and polling fallback ──

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{LinkMode, LinkStatus};
use crate::config::Eviction;
use crate::convert::entities_from_values;
use crate::error::CoreError;
use crate::model::Entity;
use crate::store::EntityCache;

/// POST one request to the relay's proxy endpoint.
///
/// Non-success answers carry `{"error": "..."}`; that message becomes a
/// [`CoreError::Api`] with the relay's status.
pub(crate) async fn proxy_request(
    http: &reqwest::Client,
    url: &Url,
    body: &Value,
) -> Result<Value, CoreError> {
    let resp = http
        .post(url.clone())
        .json(body)
        .send()
        .await
        .map_err(homelink_api::Error::from)?;

    let status = resp.status();
    let text = resp.text().await.map_err(homelink_api::Error::from)?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
        return Err(CoreError::Api {
            message,
            status: Some(status.as_u16()),
        });
    }

    serde_json::from_str(&text).map_err(|e| CoreError::Parse {
        message: format!("proxy response: {e}"),
    })
}

/// Fetch the full state list through the proxy.
pub(crate) async fn fetch_states(http: &reqwest::Client, url: &Url) -> Result<Vec<Entity>, CoreError> {
    let value = proxy_request(http, url, &json!({ "type": "get_states" })).await?;
    let list = value.as_array().ok_or_else(|| CoreError::Parse {
        message: "expected a state list".into(),
    })?;
    Ok(entities_from_values(list))
}

/// Everything the poll loop needs, borrowed from the client.
pub(crate) struct PollContext<'a> {
    pub http: &'a reqwest::Client,
    pub url: &'a Url,
    pub interval: Duration,
    pub cache: &'a EntityCache,
    pub status: &'a watch::Sender<LinkStatus>,
    pub fallback: &'a (dyn Fn() -> Vec<Entity> + Sync),
}

/// Poll the full state list until cancelled. Each success replaces the
/// cache; the first failure after a success swaps in the fallback dataset.
pub(crate) async fn run(ctx: PollContext<'_>, cancel: &CancellationToken) {
    info!(interval = ?ctx.interval, "polling for state");
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut showing_fallback = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match fetch_states(ctx.http, ctx.url).await {
            Ok(entities) => {
                let count = ctx.cache.apply_bulk(entities, Eviction::Prune);
                debug!(count, "poll refreshed state");
                showing_fallback = false;
                ctx.status.send_replace(LinkStatus {
                    connected: true,
                    error: None,
                    mode: LinkMode::Polling,
                });
            }
            Err(e) => {
                warn!(error = %e, "poll failed");
                ctx.status.send_replace(LinkStatus {
                    connected: false,
                    error: Some(e.to_string()),
                    mode: LinkMode::Polling,
                });
                if !showing_fallback {
                    let count = ctx.cache.apply_bulk((ctx.fallback)(), Eviction::Prune);
                    info!(count, "showing fallback dataset");
                    showing_fallback = true;
                }
            }
        }
    }
    debug!("poll loop stopped");
}
