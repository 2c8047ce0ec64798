//! Data models for the ingestion pipeline.
//!
//! Raw input flows through three shapes:
//! - [`RawInput`] / [`TelemetryPacket`]: the payload as received, decoded but unchecked
//! - [`PacketRow`] / [`SensorRow`]: the flattened rows produced by the formatter
//! - [`PacketRecord`] / [`SensorReading`]: rows whose shape has been checked and
//!   that are ready to be written to a store

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ParseError, RowError, StoreError};
use crate::timestamp::{Instant, TimestampNormalizer};

// ---

/// JSON type name used in human-readable error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    // ---
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A payload exactly as received: either JSON text or an already decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Text(String),
    Value(Value),
}

impl RawInput {
    /// Decode into the top-level mapping. Non-object documents are rejected.
    pub fn decode(self) -> Result<Map<String, Value>, ParseError> {
        // ---
        let value = match self {
            Self::Text(text) => serde_json::from_str(&text)?,
            Self::Value(value) => value,
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ParseError::NotAnObject(json_type_name(&other))),
        }
    }
}

impl From<&str> for RawInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RawInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for RawInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&Value> for RawInput {
    fn from(value: &Value) -> Self {
        Self::Value(value.clone())
    }
}

impl From<Map<String, Value>> for RawInput {
    fn from(map: Map<String, Value>) -> Self {
        Self::Value(Value::Object(map))
    }
}

/// One ingested envelope, decoded but not validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPacket {
    // ---
    pub timestamp: Option<Instant>,
    pub session_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub sensors: Map<String, Value>,
    pub metadata: Map<String, Value>,
    /// The decoded payload, verbatim.
    pub raw_payload: Map<String, Value>,
}

/// Packet-level row with `telemetry_metadata` keys flattened beside the envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketRow {
    // ---
    pub timestamp: Option<Instant>,
    pub session_id: Option<String>,
    pub vehicle_id: Option<String>,
    /// Compact JSON encoding of the original payload.
    pub raw_payload: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl PacketRow {
    /// Column names owned by the envelope; metadata never overrides them.
    pub const ENVELOPE_FIELDS: &'static [&'static str] =
        &["timestamp", "session_id", "vehicle_id", "raw_payload"];

    /// Look up a flattened metadata column.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// One sensor value as emitted by the formatter; the value is still untyped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRow {
    // ---
    pub timestamp: Option<Instant>,
    pub session_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub sensor_name: String,
    pub value: Value,
}

/// Output of [`crate::parser::format`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedPacket {
    pub packet: PacketRow,
    pub sensors: Vec<SensorRow>,
}

/// A sensor reading whose shape has been checked; ready to insert.
///
/// `(timestamp, session_id, vehicle_id, sensor_name)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    // ---
    pub timestamp: Instant,
    pub session_id: String,
    pub vehicle_id: String,
    pub sensor_name: String,
    pub value: f64,
}

const READING_FIELDS: [&str; 5] = ["timestamp", "session_id", "vehicle_id", "sensor_name", "value"];

impl SensorReading {
    /// Build a reading from an untyped JSON row, coercing the timestamp.
    pub fn from_json(row: &Value, normalizer: &TimestampNormalizer) -> Result<Self, RowError> {
        // ---
        let map = row
            .as_object()
            .ok_or_else(|| RowError::NotAnObject(json_type_name(row)))?;

        let missing: Vec<&'static str> = READING_FIELDS
            .iter()
            .copied()
            .filter(|field| !map.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(RowError::MissingFields(missing));
        }

        let timestamp = normalizer.normalize_json(&map["timestamp"])?;

        Ok(Self {
            timestamp,
            session_id: required_text(map["session_id"].as_str(), "session_id")?,
            vehicle_id: required_text(map["vehicle_id"].as_str(), "vehicle_id")?,
            sensor_name: required_text(map["sensor_name"].as_str(), "sensor_name")?,
            value: numeric(&map["value"])?,
        })
    }
}

impl TryFrom<&SensorRow> for SensorReading {
    type Error = RowError;

    fn try_from(row: &SensorRow) -> Result<Self, Self::Error> {
        // ---
        let timestamp = row
            .timestamp
            .ok_or_else(|| RowError::MissingFields(vec!["timestamp"]))?;

        Ok(Self {
            timestamp,
            session_id: required_text(row.session_id.as_deref(), "session_id")?,
            vehicle_id: required_text(row.vehicle_id.as_deref(), "vehicle_id")?,
            sensor_name: required_text(Some(row.sensor_name.as_str()), "sensor_name")?,
            value: numeric(&row.value)?,
        })
    }
}

/// A packet row whose envelope fields have been checked; ready to insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketRecord {
    // ---
    pub timestamp: Instant,
    pub session_id: String,
    pub vehicle_id: String,
    pub packet_id: Option<String>,
    pub sample_rate_hz: Option<f64>,
    pub daq_version: Option<String>,
    /// Every flattened metadata key, compact JSON.
    pub metadata: String,
    pub raw_payload: String,
}

impl TryFrom<&PacketRow> for PacketRecord {
    type Error = RowError;

    fn try_from(row: &PacketRow) -> Result<Self, Self::Error> {
        // ---
        let timestamp = row
            .timestamp
            .ok_or_else(|| RowError::MissingFields(vec!["timestamp"]))?;
        let metadata = serde_json::to_string(&row.metadata).unwrap_or_else(|_| "{}".to_string());

        Ok(Self {
            timestamp,
            session_id: required_text(row.session_id.as_deref(), "session_id")?,
            vehicle_id: required_text(row.vehicle_id.as_deref(), "vehicle_id")?,
            packet_id: row.get("packet_id").and_then(Value::as_str).map(String::from),
            sample_rate_hz: row.get("sample_rate_hz").and_then(Value::as_f64),
            daq_version: row.get("daq_version").and_then(Value::as_str).map(String::from),
            metadata,
            raw_payload: row.raw_payload.clone(),
        })
    }
}

fn required_text(value: Option<&str>, field: &'static str) -> Result<String, RowError> {
    // ---
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(RowError::EmptyField(field)),
    }
}

/// Booleans are not numbers here, even though some encoders treat them so.
///
/// Values are stored as DOUBLE PRECISION, so integers beyond 2^53 are
/// rounded to the nearest representable double.
fn numeric(value: &Value) -> Result<f64, RowError> {
    value.as_f64().ok_or(RowError::NonNumeric)
}

/// Result of a validation pass. `errors` holds every violation found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Success descriptor returned by the strict validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub message: String,
}

/// Why an insert call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input rejected before any write was attempted.
    Rejected,
    Connection,
    Integrity,
    Data,
    Database,
}

impl From<&StoreError> for FailureKind {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Connection(_) => Self::Connection,
            StoreError::Integrity(_) => Self::Integrity,
            StoreError::Data(_) => Self::Data,
            StoreError::Database(_) => Self::Database,
        }
    }
}

/// Result of an insert call. Insert operations report through this value
/// rather than returning an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    // ---
    pub succeeded: bool,
    pub message: String,
    pub inserted_count: u64,
    pub skipped_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl InsertOutcome {
    // ---
    pub fn success(message: impl Into<String>, inserted_count: u64, skipped_count: u64) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            inserted_count,
            skipped_count,
            failure: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            inserted_count: 0,
            skipped_count: 0,
            failure: Some(FailureKind::Rejected),
        }
    }

    pub fn store_failure(prefix: &str, err: &StoreError) -> Self {
        Self {
            succeeded: false,
            message: format!("{prefix}: {err}"),
            inserted_count: 0,
            skipped_count: 0,
            failure: Some(err.into()),
        }
    }
}
