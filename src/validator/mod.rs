//! Payload validation.
//!
//! Two payload layouts exist in the field and share operation names, so the
//! caller picks one explicitly with [`SchemaVariant`]:
//! - [`SchemaVariant::Fsae`]: fixed 14-channel `sensors` object plus `telemetry_metadata`
//! - [`SchemaVariant::SensorList`]: list of typed sensors plus device `metadata`
//!
//! Validation only reports. It never mutates or normalizes the payload, and a
//! pass always runs every check so the caller gets the full list of problems.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseError, ValidationError};
use crate::models::{json_type_name, RawInput, ValidationOutcome, ValidationReport};
use crate::timestamp::parse_iso8601;

mod fsae;
pub mod rules;
mod sensor_list;

pub use rules::{RangeRule, RuleTable};

// ---

/// Which payload layout to validate against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// Fixed-field FSAE DAQ layout.
    #[default]
    Fsae,
    /// Generic list of typed sensors.
    SensorList,
}

impl SchemaVariant {
    // ---
    /// Top-level keys the payload must carry.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Fsae => fsae::REQUIRED_FIELDS,
            Self::SensorList => sensor_list::REQUIRED_FIELDS,
        }
    }

    /// Top-level key holding the metadata block.
    pub fn metadata_key(&self) -> &'static str {
        match self {
            Self::Fsae => fsae::METADATA_KEY,
            Self::SensorList => sensor_list::METADATA_KEY,
        }
    }

    /// Default range rules: keyed by channel name (fsae) or sensor type (sensor_list).
    pub fn default_rules(&self) -> RuleTable {
        match self {
            Self::Fsae => rules::fsae_sensor_rules(),
            Self::SensorList => rules::sensor_type_rules(),
        }
    }
}

impl FromStr for SchemaVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fsae" => Ok(Self::Fsae),
            "sensor_list" | "sensor-list" => Ok(Self::SensorList),
            other => Err(format!(
                "unknown schema variant '{other}' (expected fsae|sensor_list)"
            )),
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fsae => f.write_str("fsae"),
            Self::SensorList => f.write_str("sensor_list"),
        }
    }
}

/// Validates payloads against one [`SchemaVariant`] and its rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadValidator {
    variant: SchemaVariant,
    rules: RuleTable,
}

impl PayloadValidator {
    // ---
    pub fn new(variant: SchemaVariant) -> Self {
        Self {
            variant,
            rules: variant.default_rules(),
        }
    }

    /// Add or replace a range rule. For [`SchemaVariant::Fsae`] the key also
    /// becomes a required channel; for [`SchemaVariant::SensorList`] it becomes
    /// a recognized sensor type (use the lower-case type name).
    pub fn with_rule(mut self, key: impl Into<String>, rule: RangeRule) -> Self {
        self.rules.insert(key, rule);
        self
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Check that `value` is an ISO 8601 string with a time component.
    pub fn validate_timestamp(&self, value: &Value) -> Result<(), String> {
        validate_timestamp(value)
    }

    pub fn validate_sensors(&self, sensors: &Value) -> ValidationOutcome {
        // ---
        let errors = match self.variant {
            SchemaVariant::Fsae => fsae::validate_sensors(&self.rules, sensors),
            SchemaVariant::SensorList => sensor_list::validate_sensors(&self.rules, sensors),
        };
        ValidationOutcome::from_errors(errors)
    }

    pub fn validate_metadata(&self, metadata: &Value) -> ValidationOutcome {
        // ---
        let errors = match self.variant {
            SchemaVariant::Fsae => fsae::validate_metadata(metadata),
            SchemaVariant::SensorList => sensor_list::validate_metadata(metadata),
        };
        ValidationOutcome::from_errors(errors)
    }

    /// Validate a whole payload, given as JSON text or an already decoded value.
    ///
    /// Undecodable text yields a single "Invalid JSON format" entry. Otherwise
    /// every check runs and all errors are returned together.
    pub fn validate_payload(&self, payload: impl Into<RawInput>) -> ValidationOutcome {
        // ---
        let data = match payload.into().decode() {
            Ok(data) => data,
            Err(ParseError::InvalidJson(e)) => {
                return ValidationOutcome::from_errors(vec![format!("Invalid JSON format: {e}")])
            }
            Err(ParseError::NotAnObject(kind)) => {
                return ValidationOutcome::from_errors(vec![format!(
                    "Payload must be a JSON object, got {kind}"
                )])
            }
            Err(e) => return ValidationOutcome::from_errors(vec![format!("Payload could not be decoded: {e}")]),
        };

        let mut errors: Vec<String> = self
            .variant
            .required_fields()
            .iter()
            .filter(|field| !data.contains_key(**field))
            .map(|field| format!("Payload missing required field: '{field}'"))
            .collect();

        errors.extend(match self.variant {
            SchemaVariant::Fsae => fsae::validate_envelope(&data),
            SchemaVariant::SensorList => sensor_list::validate_envelope(&data),
        });

        if let Some(sensors) = data.get("sensors") {
            errors.extend(self.validate_sensors(sensors).errors);
        }
        if let Some(metadata) = data.get(self.variant.metadata_key()) {
            errors.extend(self.validate_metadata(metadata).errors);
        }

        ValidationOutcome::from_errors(errors)
    }

    /// Like [`validate_payload`](Self::validate_payload) but fails with the
    /// joined error list when the payload is invalid.
    pub fn validate_payload_strict(
        &self,
        payload: impl Into<RawInput>,
    ) -> Result<ValidationReport, ValidationError> {
        // ---
        let outcome = self.validate_payload(payload);
        if !outcome.is_valid {
            return Err(ValidationError {
                errors: outcome.errors,
            });
        }
        Ok(ValidationReport {
            valid: true,
            errors: Vec::new(),
            message: "Payload validation successful".to_string(),
        })
    }
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new(SchemaVariant::default())
    }
}

/// Check that `value` is an ISO 8601 date-time string with a time component.
pub fn validate_timestamp(value: &Value) -> Result<(), String> {
    // ---
    let text = value
        .as_str()
        .ok_or_else(|| format!("Timestamp must be a string, got {}", json_type_name(value)))?;

    if !text.contains('T') {
        return Err(format!(
            "Invalid ISO 8601 timestamp format: {text}. Must include time component (e.g., 2024-01-15T10:30:00Z)"
        ));
    }

    parse_iso8601(text)
        .map(|_| ())
        .map_err(|e| format!("Invalid ISO 8601 timestamp format: {text}. Error: {e}"))
}

/// `None` when `value` is a non-blank string, otherwise a message prefixed by `label`.
fn check_non_empty_string(value: &Value, label: &str) -> Option<String> {
    // ---
    match value.as_str() {
        None => Some(format!("{label} must be a string")),
        Some(text) if text.trim().is_empty() => Some(format!("{label} cannot be empty")),
        Some(_) => None,
    }
}
