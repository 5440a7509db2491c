//! Decoding of inbound node reports into [`Sample`]s.
//!
//! This is the validation boundary: anything that gets past
//! [`decode_report`] has the fields the graph builder relies on.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ReportError;
use crate::sample::{parse_series, Neighbour, Payload, Sample};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    node: Option<Map<String, Value>>,
}

/// Decode one datagram (`{"type":"data","node":{...}}`).
pub fn decode_report(bytes: &[u8]) -> Result<Sample, ReportError> {
    let text = std::str::from_utf8(bytes)?;
    let env: Envelope = serde_json::from_str(text)?;
    if env.kind.as_deref() != Some("data") {
        return Err(ReportError::UnsupportedType(env.kind));
    }
    let node = env.node.ok_or(ReportError::MissingField("node"))?;
    decode_node(node)
}

/// Turn the `node` object of a report into a sample.
pub fn decode_node(mut node: Map<String, Value>) -> Result<Sample, ReportError> {
    let address = match node.remove("address") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(other) => {
            return Err(ReportError::MalformedField {
                field: "address",
                reason: format!("expected non-empty string, got {other}"),
            })
        }
        None => return Err(ReportError::MissingField("address")),
    };
    let timestamp = match node.remove("timeStamp") {
        Some(v) => as_millis(&v).ok_or_else(|| ReportError::MalformedField {
            field: "timeStamp",
            reason: format!("expected integer milliseconds, got {v}"),
        })?,
        None => return Err(ReportError::MissingField("timeStamp")),
    };
    let status = match node.remove("status") {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(ReportError::MalformedField {
                field: "status",
                reason: format!("expected string, got {other}"),
            })
        }
        None => return Err(ReportError::MissingField("status")),
    };
    let neighbours: Vec<Neighbour> = match node.remove("neighbours") {
        Some(v) => serde_json::from_value(v).map_err(|e| ReportError::MalformedField {
            field: "neighbours",
            reason: e.to_string(),
        })?,
        None => return Err(ReportError::MissingField("neighbours")),
    };
    let custom_values = match node.remove("customValues") {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };

    // remaining object-valued keys that look like series are charts
    let charts = node
        .iter()
        .filter_map(|(k, v)| parse_series(v).map(|s| (k.clone(), s)))
        .collect();

    Ok(Sample::new(
        address,
        timestamp,
        Payload {
            status,
            neighbours,
            charts,
            custom_values,
        },
    ))
}

// Some clients send longs as strings ("1461000000000" or "1461000000000L").
fn as_millis(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().trim_end_matches('L').parse().ok(),
        _ => None,
    }
}
