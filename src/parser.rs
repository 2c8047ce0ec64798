//! Packet parsing and row formatting.
//!
//! Parsing is unconditional: a decodable JSON object always becomes a
//! [`TelemetryPacket`], whether or not it would pass validation. The decoded
//! object is kept verbatim so the packet row can reproduce it exactly.
//!
//! The envelope is read according to the parser's [`SchemaVariant`]:
//!
//! - `fsae`: `session_id`, `vehicle_id`, a `sensors` map of channel to value,
//!   and `telemetry_metadata`.
//! - `sensor_list`: `metadata.device_id` is the vehicle; the session is the
//!   top-level or `metadata.session_id`, else the device id; `sensors` is a
//!   list whose `sensor_id`/`value` pairs become the channel map.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;
use crate::models::{FormattedPacket, PacketRow, RawInput, SensorRow, TelemetryPacket};
use crate::timestamp::TimestampNormalizer;
use crate::validator::SchemaVariant;

// ---

/// Turns raw payloads into [`TelemetryPacket`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketParser {
    normalizer: TimestampNormalizer,
    variant: SchemaVariant,
}

impl PacketParser {
    // ---
    pub fn new(normalizer: TimestampNormalizer) -> Self {
        Self {
            normalizer,
            variant: SchemaVariant::default(),
        }
    }

    /// Read envelopes laid out as `variant` instead of the default `fsae`.
    pub fn with_variant(mut self, variant: SchemaVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    /// Decode `input` into a packet.
    ///
    /// Fails only when the text is not JSON, the document is not an object,
    /// or a present timestamp cannot be normalized. Missing or mistyped
    /// fields are carried as `None` / empty maps; the raw payload keeps them.
    pub fn parse(&self, input: impl Into<RawInput>) -> Result<TelemetryPacket, ParseError> {
        // ---
        let payload = input.into().decode()?;

        let timestamp = match payload.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.normalizer.normalize_json(value)?),
        };

        let metadata = object_field(&payload, self.variant.metadata_key());
        let (session_id, vehicle_id, sensors) = match self.variant {
            SchemaVariant::Fsae => (
                text_field(&payload, "session_id"),
                text_field(&payload, "vehicle_id"),
                object_field(&payload, "sensors"),
            ),
            SchemaVariant::SensorList => {
                let device_id = text_field(&metadata, "device_id");
                let session_id = text_field(&payload, "session_id")
                    .or_else(|| text_field(&metadata, "session_id"))
                    .or_else(|| device_id.clone());
                (session_id, device_id, sensor_list_channels(&payload))
            }
        };

        let packet = TelemetryPacket {
            timestamp,
            session_id,
            vehicle_id,
            sensors,
            metadata,
            raw_payload: payload,
        };

        debug!(
            session_id = ?packet.session_id,
            vehicle_id = ?packet.vehicle_id,
            sensors = packet.sensors.len(),
            "parsed telemetry packet"
        );
        Ok(packet)
    }
}

/// Parse with the default normalizer.
pub fn parse(input: impl Into<RawInput>) -> Result<TelemetryPacket, ParseError> {
    PacketParser::default().parse(input)
}

/// Flatten a packet into one packet row and one row per sensor.
///
/// Sensor rows follow the payload's key order and inherit the packet's
/// timestamp, session and vehicle.
pub fn format(packet: &TelemetryPacket) -> FormattedPacket {
    // ---
    let raw_payload =
        serde_json::to_string(&packet.raw_payload).unwrap_or_else(|_| "{}".to_string());

    let sensors = packet
        .sensors
        .iter()
        .map(|(name, value)| SensorRow {
            timestamp: packet.timestamp,
            session_id: packet.session_id.clone(),
            vehicle_id: packet.vehicle_id.clone(),
            sensor_name: name.clone(),
            value: value.clone(),
        })
        .collect();

    FormattedPacket {
        packet: PacketRow {
            timestamp: packet.timestamp,
            session_id: packet.session_id.clone(),
            vehicle_id: packet.vehicle_id.clone(),
            raw_payload,
            metadata: flattenable_metadata(&packet.metadata),
        },
        sensors,
    }
}

/// Metadata keys that would shadow an envelope column are left out of the
/// flattened row; they remain in `raw_payload`.
fn flattenable_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    // ---
    metadata
        .iter()
        .filter(|(key, _)| {
            let reserved = PacketRow::ENVELOPE_FIELDS.contains(&key.as_str());
            if reserved {
                debug!(key = %key, "metadata key shadows an envelope field, not flattened");
            }
            !reserved
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl TelemetryPacket {
    pub fn format(&self) -> FormattedPacket {
        format(self)
    }
}

fn text_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(String::from)
}

/// `sensors: [{sensor_id, value, ..}]` as a channel map in list order.
/// Items without a string `sensor_id` are dropped; a repeated id keeps the
/// first value.
fn sensor_list_channels(payload: &Map<String, Value>) -> Map<String, Value> {
    // ---
    let mut channels = Map::new();
    let items = payload.get("sensors").and_then(Value::as_array);
    for item in items.into_iter().flatten().filter_map(Value::as_object) {
        let Some(id) = item.get("sensor_id").and_then(Value::as_str) else {
            continue;
        };
        let value = item.get("value").cloned().unwrap_or(Value::Null);
        channels.entry(id.to_string()).or_insert(value);
    }
    channels
}

fn object_field(payload: &Map<String, Value>, key: &str) -> Map<String, Value> {
    payload
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::timestamp::EpochZone;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample_a() -> Value {
        // ---
        json!({
            "timestamp": "2024-02-04T14:23:44.456Z",
            "session_id": "endurance_2024_02_04",
            "vehicle_id": "FSAE_LSU_2024_001",
            "sensors": {
                "engine_rpm": 4200,
                "throttle_position": 18.5,
                "brake_pressure": 845.2,
                "coolant_temp": 88.4,
                "oil_pressure": 41.7,
                "intake_air_temp": 35.9,
                "battery_voltage": 13.8,
                "speed_fl": 14.2,
                "speed_fr": 14.5,
                "speed_rl": 13.9,
                "speed_rr": 14.1,
                "steering_angle": 12.8,
                "accel_lateral": -0.15,
                "accel_longitudinal": -2.45
            },
            "telemetry_metadata": {
                "packet_id": "pkt_1707058424456",
                "sample_rate_hz": 100,
                "daq_version": "v2.1.3"
            }
        })
    }

    #[test]
    fn test_format_reproduces_raw_payload() {
        // ---
        let payload = sample_a();
        let formatted = parse(payload.clone()).unwrap().format();

        let reconstructed: Value = serde_json::from_str(&formatted.packet.raw_payload).unwrap();
        assert_eq!(reconstructed, payload);
        assert_eq!(formatted.packet.raw_payload, payload.to_string());
    }

    #[test]
    fn test_packet_row_flattens_metadata() {
        // ---
        let formatted = parse(sample_a()).unwrap().format();
        let packet = &formatted.packet;

        assert_eq!(packet.session_id.as_deref(), Some("endurance_2024_02_04"));
        assert_eq!(packet.vehicle_id.as_deref(), Some("FSAE_LSU_2024_001"));
        assert_eq!(packet.get("packet_id"), Some(&json!("pkt_1707058424456")));
        assert_eq!(packet.get("sample_rate_hz"), Some(&json!(100)));
        assert_eq!(packet.get("daq_version"), Some(&json!("v2.1.3")));

        let row = serde_json::to_value(packet).unwrap();
        assert_eq!(row["daq_version"], json!("v2.1.3"));
    }

    #[test]
    fn test_one_sensor_row_per_channel_in_payload_order() {
        // ---
        let payload = sample_a();
        let formatted = parse(payload.clone()).unwrap().format();
        let expected = payload["sensors"].as_object().unwrap();

        assert_eq!(formatted.sensors.len(), expected.len());
        for (row, (name, value)) in formatted.sensors.iter().zip(expected) {
            assert_eq!(&row.sensor_name, name);
            assert_eq!(&row.value, value);
            assert_eq!(row.session_id, formatted.packet.session_id);
            assert_eq!(row.vehicle_id, formatted.packet.vehicle_id);
            assert_eq!(row.timestamp, formatted.packet.timestamp);
        }
        assert_eq!(formatted.sensors[0].sensor_name, "engine_rpm");
    }

    #[test]
    fn test_parse_accepts_json_string() {
        // ---
        let text = sample_a().to_string();
        let packet = parse(text.as_str()).unwrap();

        assert_eq!(packet.session_id.as_deref(), Some("endurance_2024_02_04"));
        assert_eq!(
            packet.timestamp.unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 4, 14, 23, 44).unwrap()
                + chrono::Duration::milliseconds(456)
        );
    }

    #[test]
    fn test_parse_is_total_for_invalid_content() {
        // ---
        let payload = json!({ "session_id": 42, "sensors": [1, 2], "extra": null });
        let packet = parse(payload.clone()).unwrap();

        assert_eq!(packet.timestamp, None);
        assert_eq!(packet.session_id, None);
        assert!(packet.sensors.is_empty());
        assert!(packet.metadata.is_empty());
        assert_eq!(Value::Object(packet.raw_payload), payload);
    }

    #[test]
    fn test_parse_rejects_non_objects_and_bad_json() {
        // ---
        assert!(matches!(parse(json!([1, 2])), Err(ParseError::NotAnObject("array"))));
        assert!(matches!(parse("{oops"), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_parse_rejects_unparseable_timestamp() {
        // ---
        let err = parse(json!({ "timestamp": "soon" })).unwrap_err();
        assert!(matches!(err, ParseError::Timestamp(_)));
    }

    fn sensor_list_sample() -> Value {
        // ---
        json!({
            "timestamp": "2024-01-15T10:30:00Z",
            "sensors": [
                { "sensor_id": "temp_01", "type": "temperature", "value": 22.5, "unit": "celsius" },
                { "sensor_id": "hum_01", "type": "humidity", "value": 45, "unit": "percent" },
                { "type": "light", "value": 300, "unit": "lux" }
            ],
            "metadata": {
                "device_id": "device_001",
                "location": { "latitude": 30.41, "longitude": -91.18 }
            }
        })
    }

    #[test]
    fn test_sensor_list_envelope_is_mapped() {
        // ---
        let parser = PacketParser::default().with_variant(SchemaVariant::SensorList);
        let formatted = parser.parse(sensor_list_sample()).unwrap().format();

        assert_eq!(formatted.packet.vehicle_id.as_deref(), Some("device_001"));
        assert_eq!(formatted.packet.session_id.as_deref(), Some("device_001"));
        assert_eq!(formatted.packet.get("device_id"), Some(&json!("device_001")));

        let names: Vec<&str> = formatted.sensors.iter().map(|r| r.sensor_name.as_str()).collect();
        assert_eq!(names, ["temp_01", "hum_01"]);
        assert_eq!(formatted.sensors[1].value, json!(45));
        assert_eq!(formatted.packet.raw_payload, sensor_list_sample().to_string());
    }

    #[test]
    fn test_sensor_list_session_prefers_explicit_id() {
        // ---
        let mut payload = sensor_list_sample();
        payload["metadata"]["session_id"] = json!("bench_run_7");

        let parser = PacketParser::default().with_variant(SchemaVariant::SensorList);
        let packet = parser.parse(payload).unwrap();
        assert_eq!(packet.session_id.as_deref(), Some("bench_run_7"));
    }

    #[test]
    fn test_metadata_cannot_shadow_envelope_fields() {
        // ---
        let mut payload = sample_a();
        payload["telemetry_metadata"]["session_id"] = json!("OTHER");
        payload["telemetry_metadata"]["raw_payload"] = json!("x");

        let formatted = parse(payload).unwrap().format();
        assert_eq!(formatted.packet.get("session_id"), None);
        assert_eq!(formatted.packet.get("raw_payload"), None);

        let row = serde_json::to_string(&formatted.packet).unwrap();
        assert_eq!(row.matches("\"session_id\"").count(), 1);
        assert_eq!(row.matches("\"raw_payload\"").count(), 1);

        let row: Value = serde_json::from_str(&row).unwrap();
        assert_eq!(row["session_id"], json!("endurance_2024_02_04"));
        assert_eq!(row["packet_id"], json!("pkt_1707058424456"));
    }

    #[test]
    fn test_epoch_timestamp_uses_configured_zone() {
        // ---
        let parser = PacketParser::new(TimestampNormalizer::new(EpochZone::Utc));
        let packet = parser.parse(json!({ "timestamp": 1_707_056_624 })).unwrap();

        assert_eq!(packet.timestamp.unwrap().offset().local_minus_utc(), 0);
    }
}
