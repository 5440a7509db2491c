//! Telemetry samples as stored by the monitor.
//!
//! A [`Sample`] is one timestamped report from one source. The payload sits
//! behind an `Arc` and is never handed out mutably, so clones returned from the
//! store share memory with the stored history but cannot alter it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One chart series: timestamp (ms) -> value.
pub type Series = BTreeMap<i64, f64>;

/// A neighbour entry as self-reported by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub address: String,
    #[serde(rename = "bytesSend", alias = "bytesSent", default)]
    pub bytes_sent: u64,
    #[serde(rename = "bytesReceived", default)]
    pub bytes_received: u64,
    // nodes send 0/1, older tooling sends booleans
    #[serde(
        rename = "dataSend",
        alias = "isSending",
        default,
        deserialize_with = "deserialize_flag"
    )]
    pub is_sending: bool,
}

impl Neighbour {
    pub fn new(address: impl Into<String>, bytes_sent: u64, bytes_received: u64, is_sending: bool) -> Self {
        Self {
            address: address.into(),
            bytes_sent,
            bytes_received,
            is_sending,
        }
    }
}

/// Structured report body. `status` and `neighbours` are required at the
/// ingestion boundary; `charts` is the open set of named metric series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub status: String,
    pub neighbours: Vec<Neighbour>,
    pub charts: BTreeMap<String, Series>,
    pub custom_values: Map<String, Value>,
}

impl Payload {
    pub fn new(status: impl Into<String>, neighbours: Vec<Neighbour>) -> Self {
        Self {
            status: status.into(),
            neighbours,
            ..Self::default()
        }
    }

    pub fn with_chart(mut self, name: impl Into<String>, series: Series) -> Self {
        self.charts.insert(name.into(), series);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    source: String,
    timestamp: i64,
    payload: Arc<Payload>,
}

impl Sample {
    pub fn new(source: impl Into<String>, timestamp: i64, payload: Payload) -> Self {
        Self {
            source: source.into(),
            timestamp,
            payload: Arc::new(payload),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Milliseconds since epoch, as reported by the source.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn status(&self) -> &str {
        &self.payload.status
    }

    pub fn chart(&self, name: &str) -> Option<&Series> {
        self.payload.charts.get(name)
    }
}

/// Parse a chart object of the form `{"<ts>": <number or numeric string>}`.
///
/// Returns `None` when the value is not an object or any entry fails to parse,
/// so arbitrary extension keys are not mistaken for series.
pub fn parse_series(value: &Value) -> Option<Series> {
    let obj = value.as_object()?;
    obj.iter()
        .map(|(k, v)| {
            let ts = k.trim().parse::<i64>().ok()?;
            let val = match v {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            Some((ts, val))
        })
        .collect()
}

fn deserialize_flag<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(d)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn neighbour_accepts_int_and_bool_flags() {
        let n: Neighbour = serde_json::from_value(json!({
            "address": "b", "bytesSend": 10, "bytesReceived": 3, "dataSend": 1
        }))
        .unwrap();
        assert!(n.is_sending);
        assert_eq!(n.bytes_sent, 10);

        let n: Neighbour = serde_json::from_value(json!({
            "address": "b", "bytesSent": 4, "isSending": false
        }))
        .unwrap();
        assert!(!n.is_sending);
        assert_eq!(n.bytes_sent, 4);
        assert_eq!(n.bytes_received, 0);
    }

    #[test]
    fn series_parses_string_and_number_values() {
        let s = parse_series(&json!({"200": "1.5", "100": 2})).unwrap();
        assert_eq!(s.into_iter().collect::<Vec<_>>(), vec![(100, 2.0), (200, 1.5)]);
    }

    #[test]
    fn series_rejects_non_numeric_entries() {
        assert!(parse_series(&json!({"abc": 1})).is_none());
        assert!(parse_series(&json!({"1": "x"})).is_none());
        assert!(parse_series(&json!("nope")).is_none());
        assert_eq!(parse_series(&json!({})), Some(Series::new()));
    }

    #[test]
    fn clones_share_payload_without_exposing_mutation() {
        let a = Sample::new("n1", 5, Payload::new("ok", vec![]));
        let b = a.clone();
        assert!(std::ptr::eq(a.payload(), b.payload()));
        assert_eq!(b.status(), "ok");
    }
}
