// ── Push-stream consumer ──
//
// Reads the relay's `text/event-stream` response and applies each
// `data:` message to the local cache.

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use homelink_api::BridgeMessage;

use super::{LinkMode, LinkStatus};
use crate::config::Eviction;
use crate::convert::entities_from_values;
use crate::error::CoreError;
use crate::model::Entity;
use crate::store::EntityCache;

// ── Consumer ─────────────────────────────────────────────────────

/// Stream until the relay closes the response, the transport fails, or
/// `cancel` fires. `Ok` means a clean end of stream.
pub(crate) async fn consume(
    http: &reqwest::Client,
    url: &Url,
    cache: &EntityCache,
    status: &watch::Sender<LinkStatus>,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    debug!(url = %url, "opening push stream");
    let resp = http
        .get(url.clone())
        .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
        .send()
        .await
        .map_err(homelink_api::Error::from)?;

    if !resp.status().is_success() {
        return Err(CoreError::Api {
            message: format!("push stream rejected: {}", resp.status()),
            status: Some(resp.status().as_u16()),
        });
    }

    info!(url = %url, "push stream open");
    let mut events = resp.bytes_stream().eventsource();

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            event = events.next() => event,
        };

        let Some(event) = event else {
            info!("push stream ended");
            return Ok(());
        };
        let event = event.map_err(stream_error)?;

        if let Some(message) = decode(&event) {
            apply(message, cache, status);
        }
    }
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> CoreError {
    match err {
        EventStreamError::Transport(e) => homelink_api::Error::from(e).into(),
        other => CoreError::Parse {
            message: format!("push stream: {other}"),
        },
    }
}

/// The relay's message carried by one event. Events without data, or
/// with data that is not a relay message, yield `None`.
fn decode(event: &Event) -> Option<BridgeMessage> {
    if event.data.is_empty() {
        return None;
    }
    match BridgeMessage::from_json(&event.data) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "dropping malformed push message");
            None
        }
    }
}

fn apply(message: BridgeMessage, cache: &EntityCache, status: &watch::Sender<LinkStatus>) {
    match message {
        BridgeMessage::Connected => {
            info!("relay reports upstream connected");
            status.send_replace(LinkStatus {
                connected: true,
                error: None,
                mode: LinkMode::Streaming,
            });
        }
        BridgeMessage::StateChanged {
            entity_id,
            new_state,
            ..
        } => {
            trace!(%entity_id, "state changed");
            if let Some(state) = new_state {
                match Entity::try_from(state) {
                    Ok(entity) => {
                        cache.apply(entity);
                    }
                    Err(e) => warn!(%entity_id, error = %e, "dropping state with invalid id"),
                }
            }
        }
        BridgeMessage::Result {
            success: true,
            result: Some(result),
            ..
        } => {
            // A full state list replaces the local view.
            if let Some(list) = result.as_array() {
                let count = cache.apply_bulk(entities_from_values(list), Eviction::Prune);
                debug!(count, "received full state list");
            }
        }
        BridgeMessage::Result { .. } => {}
        BridgeMessage::Error { error } => {
            warn!(%error, "relay reported an error");
            status.send_modify(|s| s.error = Some(error));
        }
    }
}
