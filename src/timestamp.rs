//! Timestamp normalization.
//!
//! DAQ packets and row inserts carry timestamps in three shapes: an
//! already-typed instant, a numeric epoch (seconds), or an ISO 8601
//! string. Everything is coerced into [`Instant`], a `DateTime` that keeps
//! the offset it arrived with.
//!
//! The only rewrite applied to strings is a literal trailing `Z` becoming
//! `+00:00`. Explicit offsets pass through unchanged; strings without any
//! offset are anchored at UTC.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TimestampError;
use crate::models::json_type_name;

// ---

/// Canonical instant type used by packets and readings.
pub type Instant = DateTime<FixedOffset>;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Offset attached to instants built from numeric epochs.
///
/// The epoch itself is absolute; this only decides which offset the
/// resulting [`Instant`] is rendered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochZone {
    #[default]
    Local,
    Utc,
}

impl FromStr for EpochZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            other => Err(format!("unknown epoch zone '{other}' (expected local|utc)")),
        }
    }
}

impl fmt::Display for EpochZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
        }
    }
}

/// The accepted input shapes for [`TimestampNormalizer::normalize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestampValue<'a> {
    Instant(Instant),
    Epoch(f64),
    Text(&'a str),
}

impl From<Instant> for TimestampValue<'_> {
    fn from(value: Instant) -> Self {
        Self::Instant(value)
    }
}

impl From<f64> for TimestampValue<'_> {
    fn from(value: f64) -> Self {
        Self::Epoch(value)
    }
}

impl From<i64> for TimestampValue<'_> {
    fn from(value: i64) -> Self {
        Self::Epoch(value as f64)
    }
}

impl<'a> From<&'a str> for TimestampValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> TryFrom<&'a Value> for TimestampValue<'a> {
    type Error = TimestampError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Text(s)),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Epoch)
                .ok_or(TimestampError::UnsupportedType("number")),
            other => Err(TimestampError::UnsupportedType(json_type_name(other))),
        }
    }
}

/// Coerces heterogeneous timestamps into [`Instant`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampNormalizer {
    epoch_zone: EpochZone,
}

impl TimestampNormalizer {
    // ---
    pub fn new(epoch_zone: EpochZone) -> Self {
        Self { epoch_zone }
    }

    pub fn epoch_zone(&self) -> EpochZone {
        self.epoch_zone
    }

    pub fn normalize<'a>(&self, value: impl Into<TimestampValue<'a>>) -> Result<Instant, TimestampError> {
        // ---
        match value.into() {
            TimestampValue::Instant(instant) => Ok(instant),
            TimestampValue::Epoch(seconds) => self.from_epoch(seconds),
            TimestampValue::Text(text) => parse_iso8601(text),
        }
    }

    /// Normalize a timestamp taken straight out of a JSON document.
    pub fn normalize_json(&self, value: &Value) -> Result<Instant, TimestampError> {
        // ---
        let value = TimestampValue::try_from(value)?;
        self.normalize(value)
    }

    fn from_epoch(&self, seconds: f64) -> Result<Instant, TimestampError> {
        // ---
        if !seconds.is_finite() {
            return Err(TimestampError::EpochOutOfRange(seconds));
        }
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
        if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
            return Err(TimestampError::EpochOutOfRange(seconds));
        }
        let utc = DateTime::from_timestamp(whole as i64, nanos)
            .ok_or(TimestampError::EpochOutOfRange(seconds))?;

        Ok(match self.epoch_zone {
            EpochZone::Local => utc.with_timezone(&Local).fixed_offset(),
            EpochZone::Utc => utc.fixed_offset(),
        })
    }
}

/// Normalize with the default (local epoch) normalizer.
pub fn normalize<'a>(value: impl Into<TimestampValue<'a>>) -> Result<Instant, TimestampError> {
    TimestampNormalizer::default().normalize(value)
}

/// Parse an ISO 8601 date-time string.
///
/// Accepts `T` or space separators, optional fractional seconds, and an
/// optional offset (`Z`, `+HH:MM` or `+HHMM`). A bare `YYYY-MM-DD` is read as
/// midnight UTC.
pub fn parse_iso8601(input: &str) -> Result<Instant, TimestampError> {
    // ---
    let trimmed = input.trim();
    let text: Cow<'_, str> = match trimmed.strip_suffix('Z') {
        Some(head) => Cow::Owned(format!("{head}+00:00")),
        None => Cow::Borrowed(trimmed),
    };

    for format in OFFSET_FORMATS {
        if let Ok(instant) = DateTime::parse_from_str(&text, format) {
            return Ok(instant);
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| TimestampError::Unparseable(input.to_string()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};
    use serde_json::json;

    #[test]
    fn test_z_suffix_and_explicit_utc_offset_agree() {
        // ---
        let zulu = normalize("2024-01-15T10:30:00Z").unwrap();
        let offset = normalize("2024-01-15T10:30:00+00:00").unwrap();

        assert_eq!(zulu, offset);
        assert_eq!(zulu, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_explicit_offset_passes_through() {
        // ---
        let instant = normalize("2024-01-15T10:30:00-05:00").unwrap();

        assert_eq!(instant.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(instant.hour(), 10);
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap());
    }

    #[test]
    fn test_fractional_seconds_are_kept() {
        // ---
        let instant = normalize("2024-01-15T10:30:00.123456Z").unwrap();
        assert_eq!(instant.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_naive_string_is_anchored_at_utc() {
        // ---
        let instant = normalize("2024-01-15T10:30:00").unwrap();
        assert_eq!(instant.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_bare_date_is_midnight() {
        // ---
        let instant = normalize("2024-01-15").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        // ---
        assert!(normalize("  2024-01-15T10:30:00Z \n").is_ok());
    }

    #[test]
    fn test_garbage_is_rejected() {
        // ---
        for text in ["not-a-timestamp", "2024/01/15 10:30:00", "10:30:00", ""] {
            assert!(
                matches!(normalize(text), Err(TimestampError::Unparseable(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_epoch_is_the_same_instant_in_either_zone() {
        // ---
        let local = TimestampNormalizer::new(EpochZone::Local)
            .normalize(1_705_314_600_i64)
            .unwrap();
        let utc = TimestampNormalizer::new(EpochZone::Utc)
            .normalize(1_705_314_600_i64)
            .unwrap();

        assert_eq!(local, utc);
        assert_eq!(utc.offset().local_minus_utc(), 0);
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_fractional_epoch() {
        // ---
        let instant = TimestampNormalizer::new(EpochZone::Utc)
            .normalize(1_705_314_600.25_f64)
            .unwrap();
        assert_eq!(instant.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_non_finite_epoch_is_rejected() {
        // ---
        assert!(matches!(
            normalize(f64::NAN),
            Err(TimestampError::EpochOutOfRange(_))
        ));
    }

    #[test]
    fn test_instant_passes_through() {
        // ---
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap().fixed_offset();
        assert_eq!(normalize(instant).unwrap(), instant);
    }

    #[test]
    fn test_json_wrong_types_are_rejected() {
        // ---
        let normalizer = TimestampNormalizer::default();
        assert_eq!(
            normalizer.normalize_json(&json!(true)),
            Err(TimestampError::UnsupportedType("boolean"))
        );
        assert_eq!(
            normalizer.normalize_json(&Value::Null),
            Err(TimestampError::UnsupportedType("null"))
        );
        assert!(normalizer.normalize_json(&json!([1, 2])).is_err());
        assert!(normalizer.normalize_json(&json!(1_705_314_600)).is_ok());
    }

    #[test]
    fn test_epoch_zone_from_str() {
        // ---
        assert_eq!("UTC".parse::<EpochZone>().unwrap(), EpochZone::Utc);
        assert_eq!("local".parse::<EpochZone>().unwrap(), EpochZone::Local);
        assert!("mars".parse::<EpochZone>().is_err());
    }
}
