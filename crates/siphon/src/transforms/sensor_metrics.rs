//! 🌡️ Sensor readings in, metric documents out.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::common::{MetricDocument, MetricKind};

/// 📄 One decoded reading from the upstream feed.
///
/// Every field is optional because the feed makes no promises. A reading
/// with none of the three measurements is legal; it just produces nothing.
/// Values of `0` are present values and produce documents like any other,
/// which matters more often than you'd hope with temperatures.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorReading {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<TimestampField>,
}

/// 🕰️ The feed's timestamp comes in two dialects: an RFC 3339 string or
/// an epoch-milliseconds number. Untagged serde sorts them out.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampField {
    Epoch(serde_json::Number),
    Text(String),
}

impl TimestampField {
    /// Resolve to a concrete instant; anything unparseable falls back to
    /// the ingestion time rather than sinking the whole reading.
    fn resolve(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimestampField::Epoch(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or(fallback),
            TimestampField::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(fallback),
        }
    }
}

/// 🔄 Expand one reading into its metric documents.
///
/// Emission order is fixed: temperature, humidity, pressure. The label is
/// `{prefix}_{source}_{ordinal}` with the ordinal scoped to the current
/// fetch run. No range validation happens here; if the feed says the
/// humidity is -3000, the store gets to hear about it.
pub fn expand(reading: &SensorReading, ordinal: u64, ingested_at: DateTime<Utc>) -> Vec<MetricDocument> {
    let source = reading.source.clone().unwrap_or_else(|| "unknown".to_string());
    let timestamp = reading
        .timestamp
        .as_ref()
        .map(|t| t.resolve(ingested_at))
        .unwrap_or(ingested_at);

    let candidates = [
        (MetricKind::Temperature, reading.temperature),
        (MetricKind::Humidity, reading.humidity),
        (MetricKind::Pressure, reading.pressure),
    ];

    let mut documents = Vec::with_capacity(3);
    for (kind, value) in candidates {
        if let Some(value) = value {
            documents.push(MetricDocument {
                label: format!("{}_{}_{}", kind.label_prefix(), source, ordinal),
                value,
                timestamp,
                source: source.clone(),
                kind,
            });
        }
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_721_070_000_000).unwrap()
    }

    fn reading(json: &str) -> SensorReading {
        serde_json::from_str(json).expect("test reading should deserialize")
    }

    #[test]
    fn the_one_where_a_full_reading_makes_three_documents() {
        let docs = expand(
            &reading(r#"{"temperature":20.5,"humidity":60,"pressure":1013.25,"source":"s1"}"#),
            7,
            now(),
        );
        assert_eq!(docs.len(), 3);
        // Order is part of the contract: temperature, humidity, pressure.
        assert_eq!(docs[0].kind, MetricKind::Temperature);
        assert_eq!(docs[0].label, "temp_s1_7");
        assert_eq!(docs[1].kind, MetricKind::Humidity);
        assert_eq!(docs[1].label, "humidity_s1_7");
        assert_eq!(docs[2].kind, MetricKind::Pressure);
        assert_eq!(docs[2].label, "pressure_s1_7");
        assert_eq!(docs[2].value, 1013.25);
    }

    #[test]
    fn the_one_where_an_empty_reading_makes_nothing() {
        assert!(expand(&reading(r#"{"source":"s1"}"#), 0, now()).is_empty());
        assert!(expand(&reading("{}"), 0, now()).is_empty());
    }

    #[test]
    fn the_one_where_zero_is_a_real_value() {
        // 🧪 0°C is not "no temperature". Ask any January.
        let docs = expand(&reading(r#"{"temperature":0}"#), 0, now());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].value, 0.0);
        assert_eq!(docs[0].kind, MetricKind::Temperature);
    }

    #[test]
    fn the_one_where_the_source_defaults_to_unknown() {
        let docs = expand(&reading(r#"{"humidity":50}"#), 1, now());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "unknown");
        assert_eq!(docs[0].label, "humidity_unknown_1");
    }

    #[test]
    fn the_one_where_timestamps_speak_both_dialects() {
        let epoch = expand(&reading(r#"{"pressure":1,"timestamp":1721070000000}"#), 0, now());
        assert_eq!(epoch[0].timestamp.timestamp_millis(), 1_721_070_000_000);

        let text = expand(
            &reading(r#"{"pressure":1,"timestamp":"2024-07-15T18:20:00Z"}"#),
            0,
            now(),
        );
        assert_eq!(
            text[0].timestamp,
            DateTime::parse_from_rfc3339("2024-07-15T18:20:00Z").unwrap()
        );
    }

    #[test]
    fn the_one_where_a_garbage_timestamp_falls_back_to_ingestion_time() {
        let docs = expand(
            &reading(r#"{"temperature":3,"timestamp":"sometime last tuesday"}"#),
            0,
            now(),
        );
        assert_eq!(docs[0].timestamp, now());

        let absent = expand(&reading(r#"{"temperature":3}"#), 0, now());
        assert_eq!(absent[0].timestamp, now());
    }

    #[test]
    fn the_one_where_a_string_temperature_is_malformed() {
        // A reading with the wrong shape fails to deserialize at all;
        // the pipeline drops it upstream and keeps going.
        let result = serde_json::from_str::<SensorReading>(r#"{"temperature":"toasty"}"#);
        assert!(result.is_err());
    }
}
