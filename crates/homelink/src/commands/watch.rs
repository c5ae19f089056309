//! `watch`: follow a relay's state stream and print each change.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use tracing::warn;

use homelink_core::{BridgeClient, Entity, EntityId, LinkMode, LinkStatus, TlsVerification};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, paint_state};

/// Entities in `snapshot` whose `last_updated` differs from what was last
/// printed, restricted to `filter` when it is non-empty.
fn fresh_changes(
    snapshot: &[Arc<Entity>],
    seen: &mut HashMap<EntityId, DateTime<Utc>>,
    filter: &[EntityId],
) -> Vec<Arc<Entity>> {
    snapshot
        .iter()
        .filter(|entity| filter.is_empty() || filter.contains(&entity.id))
        .filter(|entity| seen.insert(entity.id.clone(), entity.last_updated) != Some(entity.last_updated))
        .cloned()
        .collect()
}

fn status_line(status: &LinkStatus, color: bool) -> String {
    let text = match (status.mode, status.connected, &status.error) {
        (LinkMode::Connecting, _, _) => "connecting to relay".to_owned(),
        (LinkMode::Streaming, true, _) => "streaming from relay".to_owned(),
        (LinkMode::Polling, true, _) => "push stream unavailable, polling".to_owned(),
        (_, _, Some(error)) => format!("relay unreachable ({error}), showing fallback data"),
        (_, false, None) => "relay unreachable".to_owned(),
    };
    if !color {
        return format!("* {text}");
    }
    if status.connected {
        format!("{} {text}", "●".green())
    } else {
        format!("{} {text}", "●".yellow())
    }
}

fn change_line(entity: &Entity, format: OutputFormat, color: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Table | OutputFormat::Plain => Ok(format!(
            "{}  {:<40} {}",
            entity.last_updated.format("%H:%M:%S"),
            entity.id.as_str(),
            paint_state(&entity.state, color)
        )),
        // One document per change: NDJSON, or YAML documents.
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_structured(OutputFormat::JsonCompact, entity)
        }
        OutputFormat::Yaml => Ok(format!("---\n{}", output::render_structured(format, entity)?)),
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let mut settings = cfg.bridge.clone();
    if let Some(relay) = args.relay {
        settings.relay_url = relay;
    }
    if let Some(interval) = args.poll_interval {
        settings.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
    }

    let mut client_config = homelink_config::bridge_client_config(&settings)?;
    if global.insecure {
        client_config.tls = TlsVerification::DangerAcceptInvalid;
    }

    let filter = args
        .entities
        .into_iter()
        .map(EntityId::new)
        .collect::<Result<Vec<_>, _>>()?;

    let client = BridgeClient::new(client_config)?;
    let mut entities = client.subscribe_all();
    let mut status = client.watch_status();
    client.start().await;

    let color = output::should_color(global.color);
    let mut seen = HashMap::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                }
                break Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let line = status_line(&status.borrow_and_update(), color);
                if !global.quiet {
                    eprintln!("{line}");
                }
            }
            snapshot = entities.changed() => {
                let Some(snapshot) = snapshot else { break Ok(()) };
                let lines: Result<Vec<_>, _> = fresh_changes(&snapshot, &mut seen, &filter)
                    .iter()
                    .map(|entity| change_line(entity, global.output, color))
                    .collect();
                match lines {
                    Ok(lines) => output::print_output(&lines.join("\n"), global.quiet),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    client.stop().await;
    outcome
}
