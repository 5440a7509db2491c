//! Point-in-time graph synthesis.
//!
//! Each build picks an effective time in the past (`now - base - extra`),
//! snapshots every source at that time, and merges the per-node neighbour
//! reports into one undirected edge per node pair.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::GraphError;
use crate::sample::{Neighbour, Sample};
use crate::store::MultiSourceStore;

pub const DEFAULT_CHARTS: [&str; 6] = [
    "speedChart",
    "ioTotalChart",
    "ioSendChart",
    "ioRecvChart",
    "cpuUsageChart",
    "cpuTotalUsageChart",
];

/// Fixed keys of a serialized node. Chart series share the same object, so a
/// chart may not use one of these names.
pub const NODE_KEYS: [&str; 8] = [
    "id",
    "label",
    "color",
    "status",
    "address",
    "timeStamp",
    "neighbours",
    "customValues",
];

pub fn is_node_key(name: &str) -> bool {
    NODE_KEYS.contains(&name)
}

/// Display and timing settings for graph builds.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Lookback (ms) applied to every build.
    pub base_delay: i64,
    pub status_colors: HashMap<String, String>,
    /// Color for statuses missing from `status_colors`.
    pub status_unknown: String,
    /// Chart series attached to every node.
    pub charts: Vec<String>,
    pub edge_color: String,
    pub active_edge_color: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_delay: 500,
            status_colors: HashMap::new(),
            status_unknown: "gray".into(),
            charts: DEFAULT_CHARTS.iter().map(|c| c.to_string()).collect(),
            edge_color: "orange".into(),
            active_edge_color: "green".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
    pub color: String,
    pub status: String,
    pub address: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: i64,
    pub neighbours: Vec<Neighbour>,
    #[serde(rename = "customValues")]
    pub custom_values: Map<String, Value>,
    #[serde(flatten)]
    pub charts: BTreeMap<String, Vec<(i64, f64)>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeView {
    pub id: String,
    pub from: String,
    pub to: String,
    pub arrows: String,
    pub color: String,
    #[serde(rename = "fromSend", skip_serializing_if = "Option::is_none")]
    pub from_send: Option<u64>,
    #[serde(rename = "fromReceive", skip_serializing_if = "Option::is_none")]
    pub from_receive: Option<u64>,
    #[serde(rename = "toSend", skip_serializing_if = "Option::is_none")]
    pub to_send: Option<u64>,
    #[serde(rename = "toReceive", skip_serializing_if = "Option::is_none")]
    pub to_receive: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    pub timestamp: String,
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

/// A finished build plus the nodes that had to be left out of it.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub graph: Graph,
    pub effective_time: i64,
    pub skipped: Vec<GraphError>,
}

/// Which endpoint of a canonical edge a report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    From,
    To,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::From => Side::To,
            Side::To => Side::From,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Side::From => "from",
            Side::To => "to",
        }
    }
}

/// Undirected identity of the edge between `a` and `b`, plus the side `a`
/// occupies on it. The smaller id is always `from`.
pub fn canonical_edge(a: &str, b: &str) -> (String, Side) {
    if a < b {
        (format!("{a}_:_{b}"), Side::From)
    } else {
        (format!("{b}_:_{a}"), Side::To)
    }
}

pub struct GraphSynthesizer {
    store: Arc<MultiSourceStore>,
    settings: GraphSettings,
    extra_delay: AtomicI64,
}

impl GraphSynthesizer {
    pub fn new(store: Arc<MultiSourceStore>, settings: GraphSettings) -> Self {
        Self {
            store,
            settings,
            extra_delay: AtomicI64::new(0),
        }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Replace the operator-set extra delay. Any value is accepted, and the
    /// next build uses it.
    pub fn set_delay(&self, extra: i64) {
        self.extra_delay.store(extra, Ordering::Relaxed);
    }

    pub fn delay(&self) -> i64 {
        self.extra_delay.load(Ordering::Relaxed)
    }

    pub fn effective_time(&self, now: i64) -> i64 {
        now.saturating_sub(self.settings.base_delay)
            .saturating_sub(self.delay())
    }

    pub fn build_graph(&self) -> Synthesis {
        self.build_graph_at(Utc::now().timestamp_millis())
    }

    /// Build the graph as seen from wall-clock time `now` (ms).
    pub fn build_graph_at(&self, now: i64) -> Synthesis {
        let at = self.effective_time(now);
        let snapshot = self.store.point_snapshot(at);

        let mut skipped = Vec::new();
        let mut nodes = Vec::with_capacity(snapshot.len());
        for sample in snapshot.values() {
            match self.node_view(sample, at) {
                Ok(node) => nodes.push(node),
                Err(e) => skipped.push(e),
            }
        }
        let edges = self.edges(&nodes);

        Synthesis {
            graph: Graph {
                timestamp: format_clock(at),
                nodes,
                edges,
            },
            effective_time: at,
            skipped,
        }
    }

    pub fn status_color(&self, status: &str) -> &str {
        self.settings
            .status_colors
            .get(status)
            .map(String::as_str)
            .unwrap_or(&self.settings.status_unknown)
    }

    fn node_view(&self, sample: &Sample, at: i64) -> Result<NodeView, GraphError> {
        let payload = sample.payload();
        if let Some(bad) = payload.neighbours.iter().find(|n| n.address.is_empty()) {
            return Err(GraphError::MalformedPayload {
                source_id: sample.source().to_owned(),
                reason: format!("neighbour entry without address ({} bytes sent)", bad.bytes_sent),
            });
        }

        let window = self.store.limits().window;
        let charts = self
            .settings
            .charts
            .iter()
            .map(|name| {
                let points = self.store.series_window(sample.source(), at, window, name);
                (name.clone(), points)
            })
            .collect();

        Ok(NodeView {
            id: sample.source().to_owned(),
            label: sample.source().to_owned(),
            color: self.status_color(&payload.status).to_owned(),
            status: payload.status.clone(),
            address: sample.source().to_owned(),
            timestamp: sample.timestamp(),
            neighbours: payload.neighbours.clone(),
            custom_values: payload.custom_values.clone(),
            charts,
        })
    }

    fn edges(&self, nodes: &[NodeView]) -> Vec<EdgeView> {
        let mut edges: Vec<EdgeView> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for node in nodes {
            for neighbour in &node.neighbours {
                let (id, side) = canonical_edge(&node.id, &neighbour.address);
                let slot = *index.entry(id.clone()).or_insert_with(|| {
                    let (from, to) = match side {
                        Side::From => (node.id.clone(), neighbour.address.clone()),
                        Side::To => (neighbour.address.clone(), node.id.clone()),
                    };
                    edges.push(EdgeView {
                        id,
                        from,
                        to,
                        arrows: String::new(),
                        color: self.settings.edge_color.clone(),
                        from_send: None,
                        from_receive: None,
                        to_send: None,
                        to_receive: None,
                    });
                    edges.len() - 1
                });
                let edge = &mut edges[slot];

                if neighbour.is_sending {
                    edge.arrows.push_str(side.other().as_str());
                    edge.arrows.push(';');
                    edge.color = self.settings.active_edge_color.clone();
                }
                match side {
                    Side::From => {
                        edge.from_send = Some(neighbour.bytes_sent);
                        edge.from_receive = Some(neighbour.bytes_received);
                    }
                    Side::To => {
                        edge.to_send = Some(neighbour.bytes_sent);
                        edge.to_receive = Some(neighbour.bytes_received);
                    }
                }
            }
        }
        edges
    }
}

fn format_clock(at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}
