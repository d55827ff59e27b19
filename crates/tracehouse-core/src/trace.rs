//! Trace Events
//!
//! A `Trace` is what a remote principal submits: one timestamped log/trace event
//! with a level, a hierarchical category, an optional message, an optional
//! caller-supplied id and a bag of scalar values.
//!
//! ## JSON Shape
//!
//! ```json
//! {
//!   "version": 1,
//!   "level": "info",
//!   "timestamp": "2024-05-01T10:00:00Z",
//!   "category": "api/orders",
//!   "message": "order created",
//!   "id": "client-42",
//!   "values": { "latencyMs": 12.5, "ok": true }
//! }
//! ```
//!
//! Only `version`, `level` and `timestamp` are required.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::TraceValues;

/// Wire format version of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TraceVersion {
    #[default]
    V1,
}

impl TraceVersion {
    pub fn as_u8(&self) -> u8 {
        match self {
            TraceVersion::V1 => 1,
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => Some(TraceVersion::V1),
            _ => None,
        }
    }
}

impl fmt::Display for TraceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceVersion::V1 => f.write_str("V1"),
        }
    }
}

impl Serialize for TraceVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

struct TraceVersionVisitor;

impl<'de> Visitor<'de> for TraceVersionVisitor {
    type Value = TraceVersion;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a trace version (1 or \"v1\")")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v {
            1 => Ok(TraceVersion::V1),
            _ => Err(E::invalid_value(Unexpected::Unsigned(v), &self)),
        }
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v {
            1 => Ok(TraceVersion::V1),
            _ => Err(E::invalid_value(Unexpected::Signed(v), &self)),
        }
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        TraceVersion::parse(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for TraceVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TraceVersionVisitor)
    }
}

/// Severity of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TraceLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl TraceLevel {
    const ALL: [TraceLevel; 6] = [
        TraceLevel::Trace,
        TraceLevel::Debug,
        TraceLevel::Info,
        TraceLevel::Warn,
        TraceLevel::Error,
        TraceLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::Trace => "trace",
            TraceLevel::Debug => "debug",
            TraceLevel::Info => "info",
            TraceLevel::Warn => "warn",
            TraceLevel::Error => "error",
            TraceLevel::Critical => "critical",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" => Some(TraceLevel::Trace),
            "debug" => Some(TraceLevel::Debug),
            "info" | "information" => Some(TraceLevel::Info),
            "warn" | "warning" => Some(TraceLevel::Warn),
            "error" => Some(TraceLevel::Error),
            "critical" | "fatal" => Some(TraceLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TraceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct TraceLevelVisitor;

impl<'de> Visitor<'de> for TraceLevelVisitor {
    type Value = TraceLevel;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a trace level name or ordinal 0..=5")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        usize::try_from(v)
            .ok()
            .and_then(|i| TraceLevel::ALL.get(i).copied())
            .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        usize::try_from(v)
            .ok()
            .and_then(|i| TraceLevel::ALL.get(i).copied())
            .ok_or_else(|| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        TraceLevel::parse(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for TraceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TraceLevelVisitor)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A trace as submitted by a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub version: TraceVersion,
    pub level: TraceLevel,
    pub timestamp: DateTime<Utc>,

    /// Hierarchical category, `/` or `\` separated. Sanitized at ingestion.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Caller-supplied event id, opaque to the server.
    #[serde(default, rename = "id", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(default, skip_serializing_if = "TraceValues::is_empty")]
    pub values: TraceValues,
}

impl Trace {
    /// Minimal trace with the given level, timestamp and category.
    pub fn new(level: TraceLevel, timestamp: DateTime<Utc>, category: impl Into<String>) -> Self {
        Self {
            version: TraceVersion::V1,
            level,
            timestamp,
            category: category.into(),
            message: None,
            external_id: None,
            values: TraceValues::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_values(mut self, values: TraceValues) -> Self {
        self.values = values;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TraceValue;

    #[test]
    fn test_minimal_json() {
        let trace: Trace = serde_json::from_str(
            r#"{"version": 1, "level": "info", "timestamp": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(trace.version, TraceVersion::V1);
        assert_eq!(trace.level, TraceLevel::Info);
        assert_eq!(trace.category, "");
        assert!(trace.message.is_none());
        assert!(trace.external_id.is_none());
        assert!(trace.values.is_empty());
    }

    #[test]
    fn test_full_json() {
        let trace: Trace = serde_json::from_str(
            r#"{
                "version": "V1",
                "level": "Warning",
                "timestamp": "2024-05-01T10:00:00.123+02:00",
                "category": "api/orders",
                "message": "slow",
                "id": "client-42",
                "values": {"latencyMs": 12.5}
            }"#,
        )
        .unwrap();

        assert_eq!(trace.level, TraceLevel::Warn);
        assert_eq!(trace.timestamp.to_rfc3339(), "2024-05-01T08:00:00.123+00:00");
        assert_eq!(trace.category, "api/orders");
        assert_eq!(trace.message.as_deref(), Some("slow"));
        assert_eq!(trace.external_id.as_deref(), Some("client-42"));
        assert_eq!(trace.values.get("LATENCYMS"), Some(&TraceValue::Double(12.5)));
    }

    #[test]
    fn test_null_category_is_root() {
        let trace: Trace = serde_json::from_str(
            r#"{"version": 1, "level": 2, "timestamp": "2024-05-01T10:00:00Z", "category": null}"#,
        )
        .unwrap();
        assert_eq!(trace.category, "");
        assert_eq!(trace.level, TraceLevel::Info);
    }

    #[test]
    fn test_level_ordinals() {
        let level: TraceLevel = serde_json::from_str("5").unwrap();
        assert_eq!(level, TraceLevel::Critical);
        assert!(serde_json::from_str::<TraceLevel>("6").is_err());
        assert!(serde_json::from_str::<TraceLevel>("\"loud\"").is_err());
    }

    #[test]
    fn test_missing_timestamp_rejected() {
        let result: Result<Trace, _> = serde_json::from_str(r#"{"version": 1, "level": "info"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        assert!(serde_json::from_str::<TraceVersion>("2").is_err());
        assert!(serde_json::from_str::<TraceVersion>("\"v9\"").is_err());
    }
}
