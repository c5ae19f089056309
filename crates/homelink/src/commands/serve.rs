//! `serve`: run the relay until Ctrl-C.

use tracing::{info, warn};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::config;
use crate::error::CliError;

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            // Without a signal handler the relay runs until killed.
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let session = config::session_config(global, &cfg)?;

    let mut settings = cfg.bridge.clone();
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }
    if let Some(keepalive) = args.keepalive {
        settings.keepalive = keepalive.as_secs().max(1);
    }
    let bridge = homelink_config::bridge_config(&settings, session)?;

    if !global.quiet {
        eprintln!("Relaying {} on http://{}", bridge.session.url, bridge.bind);
    }
    homelink_bridge::serve(bridge, shutdown_signal()).await?;
    Ok(())
}
