use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Pull path used by the hybrid push/pull resolver when a project has none.
pub const DEFAULT_PULL_PATH: &str = "value";
/// Pull path used by the older pull-only live widgets.
pub const LEGACY_PULL_PATH: &str = "current_power";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUnit {
    #[serde(rename = "kW")]
    Kw,
    #[serde(rename = "MW")]
    Mw,
    #[serde(rename = "Nm3/h")]
    Nm3PerHour,
}

impl PowerUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerUnit::Kw => "kW",
            PowerUnit::Mw => "MW",
            PowerUnit::Nm3PerHour => "Nm3/h",
        }
    }

    /// Lenient parse of the unit strings found in project records, push rows and
    /// third-party payloads.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("kw") {
            return Some(PowerUnit::Kw);
        }
        if trimmed.eq_ignore_ascii_case("mw") {
            return Some(PowerUnit::Mw);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "nm3/h" | "nm³/h" | "m3/h" | "m³/h" => Some(PowerUnit::Nm3PerHour),
            _ => None,
        }
    }
}

impl fmt::Display for PowerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Push,
    Pull,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Push => "push",
            SourceKind::Pull => "pull",
        }
    }
}

/// A reading as returned by one source, before it is tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub value: f64,
    pub unit: PowerUnit,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<JsonValue>,
}

/// One point-in-time measurement. Built once per acquisition and never mutated;
/// the value keeps the unit reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading {
    value: f64,
    unit: PowerUnit,
    timestamp: DateTime<Utc>,
    source_kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<JsonValue>,
}

impl TelemetryReading {
    pub fn from_raw(raw: RawReading, source_kind: SourceKind) -> Self {
        Self {
            value: raw.value,
            unit: raw.unit,
            timestamp: raw.timestamp,
            source_kind,
            metadata: raw.metadata,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> PowerUnit {
        self.unit
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn metadata(&self) -> Option<&JsonValue> {
        self.metadata.as_ref()
    }
}

/// Last known non-live value of a project, shown when no live source answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StaticFallback {
    pub value: f64,
    pub unit: PowerUnit,
}

/// Read-only projection of a project record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityTelemetryConfig {
    pub entity_id: String,
    pub pull_url: Option<String>,
    pub pull_path: Option<String>,
    pub static_fallback: Option<StaticFallback>,
}

impl EntityTelemetryConfig {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Self::default()
        }
    }

    pub fn with_pull(mut self, url: impl Into<String>, path: Option<&str>) -> Self {
        self.pull_url = Some(url.into());
        self.pull_path = path.map(str::to_string);
        self
    }

    pub fn with_static_fallback(mut self, value: f64, unit: PowerUnit) -> Self {
        self.static_fallback = Some(StaticFallback { value, unit });
        self
    }

    /// Blank URLs count as absent: no pull is attempted for them.
    pub fn pull_url(&self) -> Option<&str> {
        self.pull_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn pull_path_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.pull_path
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(default)
    }
}

/// Integer epochs below this are seconds (up to the year 5138); larger ones
/// are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Accepts RFC3339 strings, integer epoch seconds or milliseconds (told apart
/// by magnitude) and fractional epoch seconds.
pub fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        JsonValue::Number(number) => {
            if let Some(epoch) = number.as_i64() {
                if epoch.abs() < EPOCH_MILLIS_THRESHOLD {
                    millis_to_dt(epoch.checked_mul(1000)?)
                } else {
                    millis_to_dt(epoch)
                }
            } else {
                number
                    .as_f64()
                    .filter(|ts| ts.is_finite())
                    .and_then(|ts| millis_to_dt((ts * 1000.0) as i64))
            }
        }
        _ => None,
    }
}

fn millis_to_dt(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_parse_is_lenient_about_case_and_superscripts() {
        assert_eq!(PowerUnit::parse("kW"), Some(PowerUnit::Kw));
        assert_eq!(PowerUnit::parse(" KW "), Some(PowerUnit::Kw));
        assert_eq!(PowerUnit::parse("mw"), Some(PowerUnit::Mw));
        assert_eq!(PowerUnit::parse("Nm³/h"), Some(PowerUnit::Nm3PerHour));
        assert_eq!(PowerUnit::parse("m3/h"), Some(PowerUnit::Nm3PerHour));
        assert_eq!(PowerUnit::parse("°C"), None);
        assert_eq!(PowerUnit::parse(""), None);
    }

    #[test]
    fn blank_pull_settings_fall_back() {
        let config = EntityTelemetryConfig {
            entity_id: "p1".to_string(),
            pull_url: Some("   ".to_string()),
            pull_path: Some("".to_string()),
            static_fallback: None,
        };
        assert_eq!(config.pull_url(), None);
        assert_eq!(config.pull_path_or(DEFAULT_PULL_PATH), "value");
        assert_eq!(config.pull_path_or(LEGACY_PULL_PATH), "current_power");
    }

    #[test]
    fn timestamps_parse_from_strings_millis_and_seconds() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp(&json!("2024-05-01T12:00:00Z")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp() as f64)),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn integer_epoch_seconds_are_not_read_as_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!(1_714_564_800_i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_714_564_800_000_i64)), Some(expected));
    }

    #[test]
    fn reading_serializes_with_wire_names() {
        let reading = TelemetryReading::from_raw(
            RawReading {
                value: 4200.0,
                unit: PowerUnit::Kw,
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                metadata: None,
            },
            SourceKind::Push,
        );
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["unit"], "kW");
        assert_eq!(value["source_kind"], "push");
        assert!(value.get("metadata").is_none());
    }
}
