// ── Built-in fallback dataset ──
//
// Shown by the downstream client when the relay cannot be reached and no
// better dataset (configured, or last known good) exists, so consumers
// always have something to render.

use chrono::Utc;
use serde_json::{Value, json};

use crate::model::{Entity, EntityId};

/// A small, plausible home: lights, climate, sensors, doors and people.
pub fn demo_entities() -> Vec<Entity> {
    let now = Utc::now();
    let entries = [
        ("light.living_room", "on", json!({ "friendly_name": "Living Room Light", "brightness": 200, "color_temp": 370, "supported_features": 43 })),
        ("light.bedroom", "off", json!({ "friendly_name": "Bedroom Light", "brightness": 150, "color_temp": 400, "supported_features": 43 })),
        ("light.kitchen", "on", json!({ "friendly_name": "Kitchen Light", "brightness": 255, "hs_color": [30, 80], "supported_features": 43 })),
        ("light.dining_room", "on", json!({ "friendly_name": "Dining Room Light", "brightness": 200, "hs_color": [45, 70], "supported_features": 43 })),
        ("light.hallway", "off", json!({ "friendly_name": "Hallway Light", "brightness": 180, "hs_color": [60, 60], "supported_features": 43 })),
        ("light.bathroom", "on", json!({ "friendly_name": "Bathroom Light", "brightness": 220, "hs_color": [180, 50], "supported_features": 43 })),
        ("light.office", "on", json!({ "friendly_name": "Office Light", "brightness": 240, "hs_color": [200, 65], "supported_features": 43 })),
        ("climate.thermostat", "heat", json!({
            "friendly_name": "Thermostat",
            "current_temperature": 21.5,
            "temperature": 22,
            "hvac_modes": ["off", "heat", "cool", "auto"],
            "min_temp": 15,
            "max_temp": 30,
            "target_temp_step": 0.5
        })),
        ("sensor.living_room_temperature", "21.5", json!({ "friendly_name": "Living Room Temperature", "unit_of_measurement": "°C", "device_class": "temperature" })),
        ("sensor.living_room_humidity", "45", json!({ "friendly_name": "Living Room Humidity", "unit_of_measurement": "%", "device_class": "humidity" })),
        ("switch.front_door_lock", "on", json!({ "friendly_name": "Front Door Lock" })),
        ("switch.security_system", "on", json!({ "friendly_name": "Security System" })),
        ("weather.home", "22", json!({ "friendly_name": "Home Weather", "condition": "partly-cloudy", "humidity": 65, "wind_speed": 12, "temperature": 22, "forecast": [] })),
        ("person.john", "home", json!({ "friendly_name": "John" })),
        ("person.jane", "away", json!({ "friendly_name": "Jane" })),
        ("binary_sensor.front_door", "off", json!({ "friendly_name": "Front Door", "device_class": "door" })),
        ("binary_sensor.garage_door", "off", json!({ "friendly_name": "Garage Door", "device_class": "garage_door" })),
    ];

    entries
        .into_iter()
        .filter_map(|(id, state, attributes)| {
            let Value::Object(attributes) = attributes else {
                return None;
            };
            Some(Entity {
                id: EntityId::new(id).ok()?,
                state: state.into(),
                attributes,
                last_changed: now,
                last_updated: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_dataset_is_complete_and_valid() {
        let entities = demo_entities();
        assert_eq!(entities.len(), 17);
        assert!(entities.iter().all(|e| !e.friendly_name().is_empty()));
        assert!(entities.iter().any(|e| e.id.domain() == "climate"));
    }
}
