//! History handler. Goes straight to the REST API; the socket protocol
//! has no history command.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tabled::Tabled;

use homelink_api::{RestClient, TransportConfig};
use homelink_core::EntityId;

use crate::cli::{GlobalOpts, HistoryArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, paint_state};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Changed")]
    changed: String,
    #[tabled(rename = "State")]
    state: String,
}

/// `(start, end)` as RFC 3339: explicit bounds, else `since` back from `now`.
fn period(args: &HistoryArgs, now: DateTime<Utc>) -> Result<(String, String), CliError> {
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        return Ok((start.clone(), end.clone()));
    }

    let since = chrono::Duration::from_std(*args.since).map_err(|e| CliError::Validation {
        field: "since".into(),
        reason: e.to_string(),
    })?;
    let start = now - since;
    Ok((
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

/// The backend answers with one list per requested entity.
fn entries(history: &Value) -> &[Value] {
    history
        .as_array()
        .and_then(|lists| lists.first())
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

pub async fn handle(args: HistoryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = EntityId::new(args.entity_id.clone())?;
    let (start, end) = period(&args, Utc::now())?;

    let cfg = config::load(global)?;
    let session = config::session_config(global, &cfg)?;
    let rest = RestClient::new(
        session.url.clone(),
        &session.token,
        &TransportConfig {
            tls: session.tls.transport_mode(),
            timeout: Some(session.timeout),
        },
    )?;

    tracing::debug!(entity_id = %id, %start, %end, "fetching history");
    let history = rest.get_history(id.as_str(), &start, &end).await?;
    let entries = entries(&history);

    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        entries,
        |entry| HistoryRow {
            changed: entry
                .get("last_changed")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            state: paint_state(entry.get("state").and_then(Value::as_str).unwrap_or("-"), color),
        },
        |entry| entry.get("state").and_then(Value::as_str).unwrap_or_default().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn args(since: Duration, start: Option<&str>, end: Option<&str>) -> HistoryArgs {
        HistoryArgs {
            entity_id: "sensor.power".into(),
            since: since.into(),
            start: start.map(Into::into),
            end: end.map(Into::into),
        }
    }

    #[test]
    fn period_counts_back_from_now() {
        let now = DateTime::parse_from_rfc3339("2026-02-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (start, end) = period(&args(Duration::from_secs(90 * 60), None, None), now).unwrap();
        assert_eq!(start, "2026-02-10T10:30:00Z");
        assert_eq!(end, "2026-02-10T12:00:00Z");
    }

    #[test]
    fn explicit_bounds_pass_through() {
        let (start, end) = period(
            &args(
                Duration::from_secs(3600),
                Some("2026-02-01T00:00:00Z"),
                Some("2026-02-02T00:00:00Z"),
            ),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(start, "2026-02-01T00:00:00Z");
        assert_eq!(end, "2026-02-02T00:00:00Z");
    }

    #[test]
    fn entries_come_from_the_first_list() {
        let history = json!([[{ "state": "on" }, { "state": "off" }]]);
        assert_eq!(entries(&history).len(), 2);
        assert!(entries(&json!([])).is_empty());
        assert!(entries(&json!({ "message": "oops" })).is_empty());
    }
}
