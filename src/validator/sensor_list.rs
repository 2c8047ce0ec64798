//! Generic sensor-list schema.
//!
//! Devices report a list of `{sensor_id, type, value, unit}` objects plus a
//! `metadata` block locating the device. Ranges are looked up by the declared
//! sensor type rather than by field name.

use serde_json::{Map, Value};

use super::rules::RuleTable;
use super::{check_non_empty_string, validate_timestamp};
use crate::models::json_type_name;

// ---

pub(super) const REQUIRED_FIELDS: &[&str] = &["timestamp", "sensors", "metadata"];

pub(super) const METADATA_KEY: &str = "metadata";

const SENSOR_FIELDS: &[&str] = &["sensor_id", "type", "value", "unit"];

pub(super) fn validate_sensors(rules: &RuleTable, sensors: &Value) -> Vec<String> {
    // ---
    let list = match sensors {
        Value::Null => return vec!["Sensor data is missing".to_string()],
        Value::Array(list) => list,
        other => {
            return vec![format!(
                "Sensor data must be a list, got {}",
                json_type_name(other)
            )]
        }
    };
    if list.is_empty() {
        return vec!["Sensor data list cannot be empty".to_string()];
    }

    let mut errors = Vec::new();
    for (idx, sensor) in list.iter().enumerate() {
        match sensor.as_object() {
            Some(sensor) => validate_sensor(rules, idx, sensor, &mut errors),
            None => errors.push(format!(
                "Sensor at index {idx} must be a dictionary, got {}",
                json_type_name(sensor)
            )),
        }
    }
    errors
}

fn validate_sensor(rules: &RuleTable, idx: usize, sensor: &Map<String, Value>, errors: &mut Vec<String>) {
    // ---
    let at = format!("Sensor at index {idx}");

    for field in SENSOR_FIELDS.iter().filter(|f| !sensor.contains_key(**f)) {
        errors.push(format!("{at} missing required field: '{field}'"));
    }

    if let Some(id) = sensor.get("sensor_id") {
        if let Some(msg) = check_non_empty_string(id, &format!("{at}: sensor_id")) {
            errors.push(msg);
        }
    }

    // Lower-cased declared type, when it is a string at all.
    let declared = match sensor.get("type") {
        Some(Value::String(raw)) => {
            let kind = raw.to_lowercase();
            if !rules.contains_key(&kind) {
                errors.push(format!("{at}: type '{raw}' is not a recognized sensor type"));
            }
            Some(kind)
        }
        Some(_) => {
            errors.push(format!("{at}: type must be a string"));
            None
        }
        None => None,
    };

    if let Some(value) = sensor.get("value") {
        match value.as_f64() {
            None => errors.push(format!("{at}: value must be a number (int or float)")),
            Some(number) => {
                let ruled = declared
                    .as_deref()
                    .and_then(|kind| rules.get(kind).map(|rule| (kind, rule)));
                if let Some((kind, rule)) = ruled {
                    if let Some(msg) = rule.violation(&format!("{at}: {kind}"), &value.to_string(), number) {
                        errors.push(msg);
                    }
                }
            }
        }
    }

    if let Some(unit) = sensor.get("unit") {
        if !unit.is_string() {
            errors.push(format!("{at}: unit must be a string"));
        }
    }

    if let Some(ts) = sensor.get("timestamp") {
        if let Err(msg) = validate_timestamp(ts) {
            errors.push(format!("{at}: {msg}"));
        }
    }
}

pub(super) fn validate_metadata(metadata: &Value) -> Vec<String> {
    // ---
    let map = match metadata {
        Value::Null => return vec!["Metadata is missing".to_string()],
        Value::Object(map) => map,
        other => {
            return vec![format!(
                "Metadata must be a dictionary, got {}",
                json_type_name(other)
            )]
        }
    };

    let mut errors: Vec<String> = ["device_id", "location"]
        .iter()
        .filter(|field| !map.contains_key(**field))
        .map(|field| format!("Metadata missing required field: '{field}'"))
        .collect();

    if let Some(id) = map.get("device_id") {
        if let Some(msg) = check_non_empty_string(id, "Metadata: device_id") {
            errors.push(msg);
        }
    }

    if let Some(location) = map.get("location") {
        match location.as_object() {
            None => errors.push(format!(
                "Metadata: location must be a dictionary, got {}",
                json_type_name(location)
            )),
            Some(location) => {
                check_coordinate(location, "latitude", 90.0, &mut errors);
                check_coordinate(location, "longitude", 180.0, &mut errors);
            }
        }
    }

    if let Some(firmware) = map.get("firmware_version") {
        if !firmware.is_string() {
            errors.push("Metadata: firmware_version must be a string".to_string());
        }
    }

    if let Some(battery) = map.get("battery_level") {
        match battery.as_f64() {
            None => errors.push("Metadata: battery_level must be a number".to_string()),
            Some(level) if !(0.0..=100.0).contains(&level) => errors.push(format!(
                "Metadata: battery_level {battery} is out of range (0 to 100)"
            )),
            Some(_) => {}
        }
    }

    errors
}

fn check_coordinate(location: &Map<String, Value>, axis: &str, limit: f64, errors: &mut Vec<String>) {
    // ---
    match location.get(axis) {
        None => errors.push(format!("Metadata: location missing '{axis}'")),
        Some(value) => match value.as_f64() {
            None => errors.push(format!("Metadata: location.{axis} must be a number")),
            Some(deg) if !(-limit..=limit).contains(&deg) => errors.push(format!(
                "Metadata: location.{axis} {value} is out of range (-{limit} to {limit})"
            )),
            Some(_) => {}
        },
    }
}

/// Envelope checks for this variant: only the timestamp.
pub(super) fn validate_envelope(data: &Map<String, Value>) -> Vec<String> {
    // ---
    data.get("timestamp")
        .and_then(|ts| validate_timestamp(ts).err())
        .map(|msg| vec![format!("Payload: {msg}")])
        .unwrap_or_default()
}
