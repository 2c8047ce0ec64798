//! Declarative range rules.
//!
//! Each schema variant checks numeric values against a [`RuleTable`] keyed
//! either by field name (fixed-field schema) or by declared sensor type
//! (sensor-list schema). Adding a field or type is a table entry, not code.

use serde::Serialize;

// ---

/// Closed numeric bounds for one field or sensor type. Either side may be open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeRule {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: String,
}

impl RangeRule {
    // ---
    pub fn between(min: f64, max: f64, description: impl Into<String>) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            description: description.into(),
        }
    }

    pub fn at_least(min: f64, description: impl Into<String>) -> Self {
        Self {
            min: Some(min),
            max: None,
            description: description.into(),
        }
    }

    /// No bounds; the key is recognized but any number is accepted.
    pub fn unbounded(description: impl Into<String>) -> Self {
        Self {
            min: None,
            max: None,
            description: description.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    /// Describe a violation for `label`, or `None` if `value` is in range.
    ///
    /// `shown` is the value as the caller should see it (the original JSON text).
    pub fn violation(&self, label: &str, shown: &str, value: f64) -> Option<String> {
        // ---
        if self.contains(value) {
            return None;
        }
        Some(match (self.min, self.max) {
            (Some(min), Some(max)) => {
                format!("{label} value {shown} is out of range ({min} to {max})")
            }
            (Some(min), None) if min == 0.0 => format!("{label} value {shown} cannot be negative"),
            (Some(min), None) => format!("{label} value {shown} is below the minimum of {min}"),
            (None, Some(max)) => format!("{label} value {shown} is above the maximum of {max}"),
            (None, None) => return None,
        })
    }
}

/// Ordered mapping from key to [`RangeRule`]. Order is the order rules were added,
/// which is also the order violations are reported in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleTable {
    rules: Vec<(String, RangeRule)>,
}

impl RuleTable {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, replacing any existing rule for the same key.
    pub fn insert(&mut self, key: impl Into<String>, rule: RangeRule) {
        // ---
        let key = key.into();
        match self.rules.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = rule,
            None => self.rules.push((key, rule)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RangeRule> {
        self.rules.iter().find(|(k, _)| k == key).map(|(_, rule)| rule)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RangeRule)> {
        self.rules.iter().map(|(k, rule)| (k.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, RangeRule)> for RuleTable {
    fn from_iter<I: IntoIterator<Item = (K, RangeRule)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, rule) in iter {
            table.insert(key, rule);
        }
        table
    }
}

/// Physical limits for the 14 fixed DAQ channels.
const FSAE_SENSOR_RANGES: &[(&str, f64, f64, &str)] = &[
    ("engine_rpm", 0.0, 14_000.0, "engine speed, rpm"),
    ("throttle_position", 0.0, 100.0, "throttle opening, percent"),
    ("brake_pressure", 0.0, 3_000.0, "brake line pressure, psi"),
    ("coolant_temp", -40.0, 150.0, "coolant temperature, degC"),
    ("oil_pressure", 0.0, 150.0, "oil pressure, psi"),
    ("intake_air_temp", -40.0, 100.0, "intake air temperature, degC"),
    ("battery_voltage", 0.0, 20.0, "battery voltage, V"),
    ("speed_fl", 0.0, 250.0, "front-left wheel speed, km/h"),
    ("speed_fr", 0.0, 250.0, "front-right wheel speed, km/h"),
    ("speed_rl", 0.0, 250.0, "rear-left wheel speed, km/h"),
    ("speed_rr", 0.0, 250.0, "rear-right wheel speed, km/h"),
    ("steering_angle", -540.0, 540.0, "steering wheel angle, deg"),
    ("accel_lateral", -3.0, 3.0, "lateral acceleration, g"),
    ("accel_longitudinal", -3.0, 3.0, "longitudinal acceleration, g"),
];

/// Default rules for the fixed-field schema. Every key is a required sensor.
pub fn fsae_sensor_rules() -> RuleTable {
    FSAE_SENSOR_RANGES
        .iter()
        .map(|&(name, min, max, description)| (name, RangeRule::between(min, max, description)))
        .collect()
}

/// Default rules for the sensor-list schema, keyed by lower-case sensor type.
/// Every key is a recognized type; unbounded entries only mark the type as known.
pub fn sensor_type_rules() -> RuleTable {
    // ---
    let mut table = RuleTable::new();
    table.insert("temperature", RangeRule::between(-273.15, 1000.0, "degC, absolute zero upward"));
    table.insert("humidity", RangeRule::between(0.0, 100.0, "relative humidity, percent"));
    table.insert("pressure", RangeRule::between(0.0, 2000.0, "hPa"));
    table.insert("light", RangeRule::at_least(0.0, "lux"));
    table.insert("motion", RangeRule::unbounded("motion"));
    table.insert("proximity", RangeRule::unbounded("proximity"));
    table.insert("accelerometer", RangeRule::unbounded("acceleration"));
    table.insert("gyroscope", RangeRule::unbounded("angular rate"));
    table
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_fsae_table_has_fourteen_channels() {
        // ---
        let rules = fsae_sensor_rules();
        assert_eq!(rules.len(), 14);
        assert_eq!(rules.keys().next(), Some("engine_rpm"));
        assert_eq!(rules.get("steering_angle").unwrap().min, Some(-540.0));
    }

    #[test]
    fn test_violation_messages() {
        // ---
        let rpm = RangeRule::between(0.0, 14_000.0, "rpm");
        assert_eq!(rpm.violation("engine_rpm", "8500", 8500.0), None);
        assert_eq!(
            rpm.violation("engine_rpm", "25000", 25_000.0).unwrap(),
            "engine_rpm value 25000 is out of range (0 to 14000)"
        );

        let light = RangeRule::at_least(0.0, "lux");
        assert_eq!(
            light.violation("light", "-1", -1.0).unwrap(),
            "light value -1 cannot be negative"
        );
        assert!(RangeRule::unbounded("any").violation("x", "1e9", 1e9).is_none());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        // ---
        let rule = RangeRule::between(-3.0, 3.0, "g");
        assert!(rule.contains(-3.0));
        assert!(rule.contains(3.0));
        assert!(!rule.contains(3.01));
    }

    #[test]
    fn test_insert_replaces_existing_rule() {
        // ---
        let mut rules = sensor_type_rules();
        let before = rules.len();
        rules.insert("humidity", RangeRule::between(5.0, 95.0, "tight"));

        assert_eq!(rules.len(), before);
        assert_eq!(rules.get("humidity").unwrap().min, Some(5.0));
    }
}
