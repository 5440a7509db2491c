//! Node-side telemetry state: status, neighbour traffic, custom values and
//! chart series, turned into one data report per send interval.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::error::NodeError;
use crate::history::{Chart, ChartHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Processing,
    Waiting,
    Error,
    Starting,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Processing => "processing",
            NodeStatus::Waiting => "waiting",
            NodeStatus::Error => "error",
            NodeStatus::Starting => "starting",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(NodeStatus::Idle),
            "processing" => Ok(NodeStatus::Processing),
            "waiting" => Ok(NodeStatus::Waiting),
            "error" => Ok(NodeStatus::Error),
            "starting" => Ok(NodeStatus::Starting),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NeighbourIo {
    sent: u64,
    received: u64,
    sending: bool,
}

#[derive(Debug, Serialize)]
struct NeighbourReport<'a> {
    address: &'a str,
    #[serde(rename = "bytesSend")]
    bytes_send: u64,
    #[serde(rename = "bytesReceived")]
    bytes_received: u64,
    #[serde(rename = "dataSend")]
    data_send: u8,
}

#[derive(Debug, Default)]
struct NodeState {
    status: NodeStatus,
    neighbours: BTreeMap<String, NeighbourIo>,
    custom_values: Map<String, Value>,
    charts: ChartHistory,
}

/// One monitored node. Shared between the application (which records
/// traffic), the samplers, and the report sender.
#[derive(Debug)]
pub struct MonitorNode {
    address: String,
    state: Mutex<NodeState>,
    monitor_offset: AtomicI64,

    // totals since start; samplers diff these
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    process_ticks: AtomicU64,
}

impl MonitorNode {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(NodeState::default()),
            monitor_offset: AtomicI64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            process_ticks: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_status(&self, status: NodeStatus) {
        self.state.lock().status = status;
    }

    pub fn status(&self) -> NodeStatus {
        self.state.lock().status
    }

    /// Offset (ms) of this node's clock relative to the monitor's, as
    /// estimated by the clock handshake.
    pub fn set_monitor_offset(&self, offset: i64) {
        self.monitor_offset.store(offset, Ordering::Relaxed);
    }

    pub fn monitor_offset(&self) -> i64 {
        self.monitor_offset.load(Ordering::Relaxed)
    }

    /// Current time on the monitor's clock.
    pub fn monitor_time(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.monitor_offset()
    }

    pub fn set_custom_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.lock().custom_values.insert(key.into(), value.into());
    }

    /// Replace the neighbour set. Counters of neighbours that stay are kept.
    pub fn set_neighbours<S: AsRef<str>>(&self, neighbours: &[S]) {
        let mut st = self.state.lock();
        let next: BTreeMap<String, NeighbourIo> = neighbours
            .iter()
            .map(|n| {
                let n = n.as_ref();
                (n.to_string(), st.neighbours.get(n).copied().unwrap_or_default())
            })
            .collect();
        st.neighbours = next;
    }

    pub fn neighbours(&self) -> Vec<String> {
        self.state.lock().neighbours.keys().cloned().collect()
    }

    /// Record `bytes` sent to `address`; marks the link as sending until the
    /// next report.
    pub fn add_send_io(&self, address: &str, bytes: u64) -> Result<(), NodeError> {
        let mut st = self.state.lock();
        let io = st
            .neighbours
            .get_mut(address)
            .ok_or_else(|| NodeError::UnknownNeighbour(address.to_string()))?;
        io.sent += bytes;
        io.sending = true;
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    pub fn add_receive_io(&self, address: &str, bytes: u64) -> Result<(), NodeError> {
        let mut st = self.state.lock();
        let io = st
            .neighbours
            .get_mut(address)
            .ok_or_else(|| NodeError::UnknownNeighbour(address.to_string()))?;
        io.received += bytes;
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// One unit of application work, used for the relative speed chart.
    pub fn incr_process_ticks(&self) {
        self.process_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn io_totals(&self) -> (u64, u64) {
        (
            self.bytes_sent.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
        )
    }

    pub fn process_ticks(&self) -> u64 {
        self.process_ticks.load(Ordering::Relaxed)
    }

    pub fn record_chart(&self, chart: Chart, ts: i64, value: f64) {
        self.state.lock().charts.record(chart, ts, value);
    }

    /// Build the `node` object of a data report. Drains the chart series and
    /// clears every neighbour's sending flag.
    pub fn to_report(&self) -> Value {
        let timestamp = self.monitor_time();
        let mut st = self.state.lock();

        let neighbours: Vec<Value> = st
            .neighbours
            .iter()
            .map(|(address, io)| {
                json!(NeighbourReport {
                    address,
                    bytes_send: io.sent,
                    bytes_received: io.received,
                    data_send: u8::from(io.sending),
                })
            })
            .collect();
        for io in st.neighbours.values_mut() {
            io.sending = false;
        }

        let mut node = Map::new();
        node.insert("address".into(), json!(self.address));
        node.insert("status".into(), json!(st.status));
        node.insert("timeStamp".into(), json!(timestamp));
        for (chart, series) in st.charts.drain() {
            let points: Map<String, Value> = series
                .into_iter()
                .map(|(ts, v)| (ts.to_string(), json!(v)))
                .collect();
            node.insert(chart.as_str().into(), Value::Object(points));
        }
        node.insert("neighbours".into(), Value::Array(neighbours));
        node.insert("customValues".into(), Value::Object(st.custom_values.clone()));
        Value::Object(node)
    }

    /// Full datagram body: `{"type":"data","node":{...}}`.
    pub fn data_report(&self) -> Value {
        json!({"type": "data", "node": self.to_report()})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_required_fields() {
        let node = MonitorNode::new("10.0.0.1");
        node.set_status(NodeStatus::Processing);
        node.set_custom_value("battery", 80);
        let r = node.data_report();
        assert_eq!(r["type"], "data");
        let n = &r["node"];
        assert_eq!(n["address"], "10.0.0.1");
        assert_eq!(n["status"], "processing");
        assert!(n["timeStamp"].is_i64());
        assert_eq!(n["neighbours"], json!([]));
        assert_eq!(n["customValues"]["battery"], 80);
        for c in Chart::ALL {
            assert!(n[c.as_str()].is_object(), "missing {}", c.as_str());
        }
    }

    #[test]
    fn send_flag_resets_after_report() {
        let node = MonitorNode::new("a");
        node.set_neighbours(&["b", "c"]);
        node.add_send_io("b", 10).unwrap();
        node.add_receive_io("c", 4).unwrap();

        let first = node.to_report();
        let b = &first["neighbours"][0];
        assert_eq!(b["address"], "b");
        assert_eq!(b["bytesSend"], 10);
        assert_eq!(b["dataSend"], 1);
        assert_eq!(first["neighbours"][1]["bytesReceived"], 4);

        let second = node.to_report();
        assert_eq!(second["neighbours"][0]["dataSend"], 0);
        assert_eq!(second["neighbours"][0]["bytesSend"], 10);
        assert_eq!(node.io_totals(), (10, 4));
    }

    #[test]
    fn neighbour_reset_keeps_retained_counters() {
        let node = MonitorNode::new("a");
        node.set_neighbours(&["b", "c"]);
        node.add_send_io("b", 7).unwrap();
        node.set_neighbours(&["b", "d"]);
        assert_eq!(node.neighbours(), vec!["b", "d"]);
        let r = node.to_report();
        assert_eq!(r["neighbours"][0]["bytesSend"], 7);
        assert_eq!(r["neighbours"][1]["bytesSend"], 0);
    }

    #[test]
    fn unknown_neighbour_is_an_error() {
        let node = MonitorNode::new("a");
        assert!(matches!(
            node.add_send_io("zz", 1),
            Err(NodeError::UnknownNeighbour(n)) if n == "zz"
        ));
        assert_eq!(node.io_totals(), (0, 0));
    }

    #[test]
    fn charts_drain_into_report() {
        let node = MonitorNode::new("a");
        node.record_chart(Chart::CpuTotalUsage, 1000, 42.5);
        let r = node.to_report();
        assert_eq!(r["cpuTotalUsageChart"]["1000"], 42.5);
        let again = node.to_report();
        assert_eq!(again["cpuTotalUsageChart"], json!({}));
    }

    #[test]
    fn monitor_time_applies_offset() {
        let node = MonitorNode::new("a");
        node.set_monitor_offset(-60_000);
        let now = chrono::Utc::now().timestamp_millis();
        assert!(node.monitor_time() >= now + 60_000);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Waiting".parse::<NodeStatus>(), Ok(NodeStatus::Waiting));
        assert!("sleeping".parse::<NodeStatus>().is_err());
        assert_eq!(NodeStatus::default().to_string(), "idle");
    }
}
