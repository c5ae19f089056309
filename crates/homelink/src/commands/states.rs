//! Entity listing and detail handlers.

use serde_json::Value;
use tabled::Tabled;

use homelink_core::convert::entities_from_values;
use homelink_core::{Command as CoreCommand, Entity, EntityId, Session};

use crate::cli::{GetArgs, GlobalOpts, StatesArgs};
use crate::error::CliError;
use crate::output::{self, paint_state};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Changed")]
    changed: String,
}

impl EntityRow {
    fn new(entity: &Entity, color: bool) -> Self {
        let state = match entity
            .attribute("unit_of_measurement")
            .and_then(Value::as_str)
        {
            Some(unit) => format!("{} {unit}", entity.state),
            None => entity.state.clone(),
        };
        Self {
            entity_id: entity.id.to_string(),
            state: paint_state(&state, color),
            name: entity.friendly_name().to_owned(),
            changed: entity.last_changed.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn detail(entity: &Entity, color: bool) -> String {
    let mut lines = vec![
        format!("Entity:       {}", entity.id),
        format!("Name:         {}", entity.friendly_name()),
        format!("State:        {}", paint_state(&entity.state, color)),
        format!("Last changed: {}", entity.last_changed.to_rfc3339()),
        format!("Last updated: {}", entity.last_updated.to_rfc3339()),
    ];

    if !entity.attributes.is_empty() {
        lines.push("Attributes:".into());
        for (key, value) in &entity.attributes {
            let shown = value.as_str().map_or_else(|| value.to_string(), str::to_owned);
            lines.push(format!("  {key}: {shown}"));
        }
    }

    lines.join("\n")
}

fn matches(entity: &Entity, args: &StatesArgs) -> bool {
    args.domain.as_deref().is_none_or(|d| entity.id.domain() == d)
        && args.state.as_deref().is_none_or(|s| entity.state == s)
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(session: &Session, args: StatesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let reply = session
        .request(CoreCommand::GetStates, session.config().state_timeout)
        .await?;

    let mut entities: Vec<Entity> = reply
        .as_array()
        .map(|list| entities_from_values(list))
        .unwrap_or_default();
    entities.retain(|e| matches(e, &args));
    entities.sort_by(|a, b| a.id.cmp(&b.id));

    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        &entities,
        |e| EntityRow::new(e, color),
        |e| e.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(session: &Session, args: GetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = EntityId::new(args.entity_id)?;
    let entity = session.get_state(&id).await?;

    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        entity.as_ref(),
        |e| detail(e, color),
        |e| e.state.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use homelink_core::convert::entity_from_value;

    fn sensor() -> Entity {
        entity_from_value(&json!({
            "entity_id": "sensor.living_room_temperature",
            "state": "21.5",
            "attributes": { "friendly_name": "Living Room", "unit_of_measurement": "°C" },
            "last_changed": "2026-02-10T12:00:00Z",
            "last_updated": "2026-02-10T12:05:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn row_appends_unit() {
        let row = EntityRow::new(&sensor(), false);
        assert_eq!(row.state, "21.5 °C");
        assert_eq!(row.name, "Living Room");
        assert_eq!(row.changed, "2026-02-10 12:00:00");
    }

    #[test]
    fn detail_lists_attributes_in_key_order() {
        let out = detail(&sensor(), false);
        let name = out.find("friendly_name: Living Room").unwrap();
        let unit = out.find("unit_of_measurement: °C").unwrap();
        assert!(name < unit);
        assert!(out.contains("State:        21.5"));
    }

    #[test]
    fn filters_by_domain_and_state() {
        let by_domain = StatesArgs {
            domain: Some("sensor".into()),
            state: None,
        };
        assert!(matches(&sensor(), &by_domain));

        let by_state = StatesArgs {
            domain: None,
            state: Some("on".into()),
        };
        assert!(!matches(&sensor(), &by_state));
    }
}
