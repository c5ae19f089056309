use std::future::Future;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use homelink_api::{RestClient, TransportConfig};
use homelink_core::Session;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::relay::Relay;
use crate::routes::{AppState, build_router};

/// Connect upstream, serve the relay until `shutdown` resolves, then
/// close the upstream session.
///
/// The listener starts before the upstream handshake finishes; push-stream
/// listeners that join early get `connected` once it does. A rejected
/// token is logged and relayed but does not stop the proxy.
pub async fn serve<F>(config: BridgeConfig, shutdown: F) -> Result<(), BridgeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let session = Session::new(config.session.clone())?;
    let rest = RestClient::new(
        config.session.url.clone(),
        &config.session.token,
        &TransportConfig {
            tls: config.session.tls.transport_mode(),
            timeout: Some(config.session.timeout),
        },
    )?;

    let cancel = CancellationToken::new();
    let relay = Relay::new(config.listener_buffer);
    let relay_task = relay.spawn(&session, cancel.clone());

    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: config.bind,
            source,
        })?;
    info!(
        addr = %config.bind,
        upstream = %session.websocket_url(),
        "relay listening"
    );

    let upstream = session.clone();
    tokio::spawn(async move {
        match upstream.connect().await {
            Ok(()) => info!("upstream session authenticated"),
            Err(e) if e.is_fatal() => error!(error = %e, "upstream session stopped"),
            Err(e) => warn!(error = %e, "upstream not reachable yet, retrying in background"),
        }
    });

    let app = build_router(AppState::new(session.clone(), relay, rest, config.sse_keepalive));
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    info!("relay shutting down");
    session.disconnect().await;
    cancel.cancel();
    let _ = relay_task.await;

    Ok(result?)
}
