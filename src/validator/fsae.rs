//! Fixed-field telemetry schema.
//!
//! The DAQ emits one flat `sensors` object with a fixed set of channels and a
//! `telemetry_metadata` object describing the packet. Every channel named in
//! the rule table is required, must be numeric and must sit inside its range.

use serde_json::{Map, Value};

use super::rules::RuleTable;
use super::{check_non_empty_string, validate_timestamp};
use crate::models::json_type_name;

// ---

pub(super) const REQUIRED_FIELDS: &[&str] = &[
    "timestamp",
    "session_id",
    "vehicle_id",
    "sensors",
    "telemetry_metadata",
];

pub(super) const METADATA_KEY: &str = "telemetry_metadata";

const REQUIRED_METADATA: &[&str] = &["packet_id", "sample_rate_hz", "daq_version"];

pub(super) fn validate_sensors(rules: &RuleTable, sensors: &Value) -> Vec<String> {
    // ---
    let map = match sensors {
        Value::Null => return vec!["Sensor data is missing".to_string()],
        Value::Object(map) => map,
        other => {
            return vec![format!(
                "Sensor data must be a dictionary, got {}",
                json_type_name(other)
            )]
        }
    };

    let mut errors = Vec::new();
    for (name, rule) in rules.iter() {
        match map.get(name) {
            None => errors.push(format!("Sensor data missing required field: '{name}'")),
            Some(value) => match value.as_f64() {
                None => errors.push(format!(
                    "Sensor '{name}' must be a number, got {}",
                    json_type_name(value)
                )),
                Some(number) => {
                    if let Some(msg) =
                        rule.violation(&format!("Sensor '{name}'"), &value.to_string(), number)
                    {
                        errors.push(msg);
                    }
                }
            },
        }
    }

    for name in map.keys().filter(|name| !rules.contains_key(name)) {
        errors.push(format!("Sensor '{name}' is not a recognized telemetry channel"));
    }

    errors
}

pub(super) fn validate_metadata(metadata: &Value) -> Vec<String> {
    // ---
    let map = match metadata {
        Value::Null => return vec!["Telemetry metadata is missing".to_string()],
        Value::Object(map) => map,
        other => {
            return vec![format!(
                "Telemetry metadata must be a dictionary, got {}",
                json_type_name(other)
            )]
        }
    };

    let mut errors: Vec<String> = REQUIRED_METADATA
        .iter()
        .filter(|field| !map.contains_key(**field))
        .map(|field| format!("Telemetry metadata missing required field: '{field}'"))
        .collect();

    for field in ["packet_id", "daq_version"] {
        if let Some(value) = map.get(field) {
            if let Some(msg) = check_non_empty_string(value, &format!("Telemetry metadata: {field}")) {
                errors.push(msg);
            }
        }
    }

    if let Some(rate) = map.get("sample_rate_hz") {
        match rate.as_f64() {
            None => errors.push("Telemetry metadata: sample_rate_hz must be a number".to_string()),
            Some(hz) if hz <= 0.0 => errors.push(format!(
                "Telemetry metadata: sample_rate_hz must be positive, got {rate}"
            )),
            Some(_) => {}
        }
    }

    errors
}

/// Checks specific to this variant's envelope: the two identifiers.
pub(super) fn validate_envelope(data: &Map<String, Value>) -> Vec<String> {
    // ---
    let mut errors = Vec::new();
    if let Some(ts) = data.get("timestamp") {
        if let Err(msg) = validate_timestamp(ts) {
            errors.push(format!("Payload: {msg}"));
        }
    }
    for field in ["session_id", "vehicle_id"] {
        if let Some(value) = data.get(field) {
            if let Some(msg) = check_non_empty_string(value, &format!("Payload: {field}")) {
                errors.push(msg);
            }
        }
    }
    errors
}
