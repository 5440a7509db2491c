//! Monitor configuration: a JSON file with every key optional, plus a few
//! environment overrides.
//! Stored under XDG config dir: $XDG_CONFIG_HOME/meshmon/config.json (fallback ~/.config/meshmon/config.json)

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path, path::PathBuf};
use tracing::warn;

use crate::buffer::BufferLimits;
use crate::graph::{is_node_key, GraphSettings, DEFAULT_CHARTS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // Connection
    pub ip: String,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub udp_max_packet_size: usize,
    pub tcp_max_packet_size: usize,

    // Retention
    pub packet_list_limit: usize,
    pub max_offset: i64,
    pub array_length: i64,

    // UI
    pub ui_port: u16,
    pub default_delay: i64,
    pub status_colors: HashMap<String, String>,
    pub status_unknown: String,
    pub charts: Vec<String>,
    pub edge_color: String,
    pub active_edge_color: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let limits = BufferLimits::default();
        let graph = GraphSettings::default();
        Self {
            ip: "127.0.0.1".into(),
            udp_port: 7000,
            tcp_port: 7001,
            udp_max_packet_size: 8096,
            tcp_max_packet_size: 8096,
            packet_list_limit: limits.capacity,
            max_offset: limits.tolerance,
            array_length: limits.window,
            ui_port: 3000,
            default_delay: graph.base_delay,
            status_colors: graph.status_colors,
            status_unknown: graph.status_unknown,
            charts: DEFAULT_CHARTS.iter().map(|c| c.to_string()).collect(),
            edge_color: graph.edge_color,
            active_edge_color: graph.active_edge_color,
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("meshmon")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meshmon")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

impl MonitorConfig {
    /// Load from `path`, or the default location when `None`. A missing file
    /// yields defaults; an unreadable or unparsable one is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing config {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading config {}", path.display())),
        }
    }

    /// Apply `MESHMON_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|k| std::env::var(k).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup("MESHMON_BIND_IP").filter(|v| !v.trim().is_empty()) {
            self.ip = ip.trim().to_string();
        }
        if let Some(p) = parse_var(&lookup, "MESHMON_UDP_PORT") {
            self.udp_port = p;
        }
        if let Some(p) = parse_var(&lookup, "MESHMON_TCP_PORT") {
            self.tcp_port = p;
        }
        if let Some(p) = parse_var(&lookup, "MESHMON_UI_PORT") {
            self.ui_port = p;
        }
        if let Some(d) = parse_var(&lookup, "MESHMON_DEFAULT_DELAY_MS") {
            self.default_delay = d;
        }
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits {
            capacity: self.packet_list_limit,
            tolerance: self.max_offset,
            window: self.array_length,
        }
    }

    /// Graph settings from this config. Charts named like a fixed node key
    /// would collide with it in the node JSON and are skipped.
    pub fn graph_settings(&self) -> GraphSettings {
        let charts = self
            .charts
            .iter()
            .filter(|c| {
                let clash = is_node_key(c);
                if clash {
                    warn!("chart {c:?} clashes with a node field; skipping it");
                }
                !clash
            })
            .cloned()
            .collect();
        GraphSettings {
            base_delay: self.default_delay,
            status_colors: self.status_colors.clone(),
            status_unknown: self.status_unknown.clone(),
            charts,
            edge_color: self.edge_color.clone(),
            active_edge_color: self.active_edge_color.clone(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
