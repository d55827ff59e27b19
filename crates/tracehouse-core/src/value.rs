//! Trace Values
//!
//! Each trace may carry a bag of named scalar values. These become extra CSV
//! columns, one per distinct key, so two rules matter:
//!
//! - Keys are case-insensitive. `Latency` and `latency` name the same column, and a
//!   single trace carrying both is malformed.
//! - Iteration order is the lower-cased key order, which is also the column order.
//!
//! ## JSON Mapping
//!
//! | JSON            | TraceValue                  |
//! |-----------------|-----------------------------|
//! | `true`/`false`  | `Bool`                      |
//! | integer literal | `Decimal` (scale 0)         |
//! | other number    | `Double`                    |
//! | string          | `String`                    |
//! | `null`          | value omitted               |
//!
//! `Float`, scaled `Decimal` and `Duration` values are built from Rust code.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// Fixed-point decimal: `units / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    units: i128,
    scale: u32,
}

impl Decimal {
    pub fn new(units: i128, scale: u32) -> Self {
        Self { units, scale }
    }

    pub fn units(&self) -> i128 {
        self.units
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.units);
        }

        let digits = self.units.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        let sign = if self.units < 0 { "-" } else { "" };
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

/// A single scalar value attached to a trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceValue {
    Bool(bool),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Duration(Duration),
    String(String),
}

impl TraceValue {
    /// Text written into the CSV cell for this value.
    pub fn to_cell(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Bool(b) => write!(f, "{}", b),
            TraceValue::Float(v) => write!(f, "{}", v),
            TraceValue::Double(v) => write!(f, "{}", v),
            TraceValue::Decimal(d) => write!(f, "{}", d),
            TraceValue::Duration(d) => write!(f, "{}", format_duration(*d)),
            TraceValue::String(s) => f.write_str(s),
        }
    }
}

/// Formats as `[d.]hh:mm:ss[.fffffff]` (100ns precision).
fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86_400;
    let hours = (total / 3_600) % 24;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    let ticks = d.subsec_nanos() / 100;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}

impl From<bool> for TraceValue {
    fn from(v: bool) -> Self {
        TraceValue::Bool(v)
    }
}

impl From<f32> for TraceValue {
    fn from(v: f32) -> Self {
        TraceValue::Float(v)
    }
}

impl From<f64> for TraceValue {
    fn from(v: f64) -> Self {
        TraceValue::Double(v)
    }
}

impl From<i64> for TraceValue {
    fn from(v: i64) -> Self {
        TraceValue::Decimal(Decimal::new(v as i128, 0))
    }
}

impl From<Decimal> for TraceValue {
    fn from(v: Decimal) -> Self {
        TraceValue::Decimal(v)
    }
}

impl From<Duration> for TraceValue {
    fn from(v: Duration) -> Self {
        TraceValue::Duration(v)
    }
}

impl From<&str> for TraceValue {
    fn from(v: &str) -> Self {
        TraceValue::String(v.to_string())
    }
}

impl From<String> for TraceValue {
    fn from(v: String) -> Self {
        TraceValue::String(v)
    }
}

impl Serialize for TraceValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TraceValue::Bool(b) => serializer.serialize_bool(*b),
            TraceValue::Float(v) => serializer.serialize_f32(*v),
            TraceValue::Double(v) => serializer.serialize_f64(*v),
            TraceValue::Decimal(d) if d.scale == 0 => match i64::try_from(d.units) {
                Ok(v) => serializer.serialize_i64(v),
                Err(_) => serializer.collect_str(d),
            },
            other => serializer.collect_str(other),
        }
    }
}

struct TraceValueVisitor;

impl<'de> Visitor<'de> for TraceValueVisitor {
    type Value = Option<TraceValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number, string or null")
    }

    fn visit_bool<E>(self, v: bool) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Some(TraceValue::Bool(v)))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Some(TraceValue::Decimal(Decimal::new(v as i128, 0))))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Some(TraceValue::Decimal(Decimal::new(v as i128, 0))))
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Some(TraceValue::Double(v)))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Some(TraceValue::String(v.to_string())))
    }

    fn visit_string<E>(self, v: String) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Some(TraceValue::String(v)))
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(None)
    }

    fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        deserializer.deserialize_any(TraceValueVisitor)
    }
}

/// Wrapper so a map value can be deserialized as "maybe a scalar".
struct MaybeValue(Option<TraceValue>);

impl<'de> Deserialize<'de> for MaybeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TraceValueVisitor).map(MaybeValue)
    }
}

/// Case-insensitive, key-unique map of trace values.
///
/// Internally keyed by the lower-cased name; the caller's spelling is kept for
/// display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceValues {
    entries: BTreeMap<String, (String, TraceValue)>,
}

impl TraceValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. Fails if a key with the same case-insensitive name exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TraceValue>) -> Result<()> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CoreError::InvalidTrace("empty value key".to_string()));
        }

        let folded = key.to_lowercase();
        if self.entries.contains_key(&folded) {
            return Err(CoreError::DuplicateValueKey(key));
        }
        self.entries.insert(folded, (key, value.into()));
        Ok(())
    }

    /// Look up by any casing of the key.
    pub fn get(&self, key: &str) -> Option<&TraceValue> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(folded_key, display_key, value)` in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &TraceValue)> {
        self.entries
            .iter()
            .map(|(folded, (display, value))| (folded.as_str(), display.as_str(), value))
    }
}

impl Serialize for TraceValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (_, (key, value)) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct TraceValuesVisitor;

impl<'de> Visitor<'de> for TraceValuesVisitor {
    type Value = TraceValues;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of scalar values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut values = TraceValues::new();
        while let Some((key, MaybeValue(value))) = access.next_entry::<String, MaybeValue>()? {
            match value {
                Some(value) => values.insert(key, value).map_err(serde::de::Error::custom)?,
                None => continue,
            }
        }
        Ok(values)
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(TraceValues::new())
    }
}

impl<'de> Deserialize<'de> for TraceValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TraceValuesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_keys() {
        let mut values = TraceValues::new();
        values.insert("Latency", 1.5f64).unwrap();
        assert_eq!(values.get("latency"), Some(&TraceValue::Double(1.5)));
        assert_eq!(values.get("LATENCY"), Some(&TraceValue::Double(1.5)));

        let err = values.insert("LATENCY", 2.0f64).unwrap_err();
        assert_eq!(err, CoreError::DuplicateValueKey("LATENCY".to_string()));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_iteration_is_sorted_case_insensitively() {
        let mut values = TraceValues::new();
        values.insert("zeta", true).unwrap();
        values.insert("Alpha", "a").unwrap();
        values.insert("beta", 3i64).unwrap();

        let keys: Vec<&str> = values.iter().map(|(_, display, _)| display).collect();
        assert_eq!(keys, vec!["Alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_json_mapping() {
        let values: TraceValues = serde_json::from_str(
            r#"{"ok": true, "count": 42, "ratio": 0.25, "name": "svc", "missing": null}"#,
        )
        .unwrap();

        assert_eq!(values.get("ok"), Some(&TraceValue::Bool(true)));
        assert_eq!(values.get("count"), Some(&TraceValue::Decimal(Decimal::new(42, 0))));
        assert_eq!(values.get("ratio"), Some(&TraceValue::Double(0.25)));
        assert_eq!(values.get("name"), Some(&TraceValue::String("svc".to_string())));
        assert_eq!(values.get("missing"), None);
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn test_json_duplicate_keys_rejected() {
        let result: std::result::Result<TraceValues, _> =
            serde_json::from_str(r#"{"Key": 1, "key": 2}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(7, 0).to_string(), "7");
        assert_eq!(Decimal::new(100, 2).to_string(), "1.00");
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(TraceValue::from(Duration::from_secs(3_723)).to_cell(), "01:02:03");
        assert_eq!(
            TraceValue::from(Duration::from_millis(1_500)).to_cell(),
            "00:00:01.5000000"
        );
        assert_eq!(
            TraceValue::from(Duration::from_secs(90_061)).to_cell(),
            "1.01:01:01"
        );
    }
}
