//! Entry point for a stand-alone reporting node. Parses args, syncs with the
//! monitor and reports until Ctrl-C.

use anyhow::Context;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meshmon_node::node::{MonitorNode, NodeStatus};
use meshmon_node::reporter::{start_monitor, ReporterOptions};

const USAGE: &str = "Usage: meshmon_node [--monitor HOST|-m HOST] [--address ADDR|-a ADDR] \
[--neighbour ADDR|-n ADDR]... [--status STATUS] [--udp-port PORT] [--tcp-port PORT] \
[--interval MS] [--no-sync]";

#[derive(Debug)]
struct ParsedArgs {
    monitor: String,
    address: Option<String>,
    neighbours: Vec<String>,
    status: NodeStatus,
    udp_port: u16,
    tcp_port: u16,
    interval_ms: u64,
    sync: bool,
}

impl Default for ParsedArgs {
    fn default() -> Self {
        Self {
            monitor: "127.0.0.1".into(),
            address: None,
            neighbours: Vec::new(),
            status: NodeStatus::Idle,
            udp_port: 7000,
            tcp_port: 7001,
            interval_ms: 500,
            sync: true,
        }
    }
}

fn value(flag: &str, v: Option<String>) -> Result<String, String> {
    v.ok_or_else(|| format!("{flag} needs a value\n{USAGE}"))
}

fn parse_num<T: std::str::FromStr>(flag: &str, v: Option<String>) -> Result<T, String> {
    let v = value(flag, v)?;
    v.parse()
        .map_err(|_| format!("invalid value {v:?} for {flag}\n{USAGE}"))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut p = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--monitor" | "-m" => p.monitor = value(&arg, it.next())?,
            "--address" | "-a" => p.address = Some(value(&arg, it.next())?),
            "--neighbour" | "-n" => p.neighbours.push(value(&arg, it.next())?),
            "--status" => p.status = parse_num(&arg, it.next())?,
            "--udp-port" => p.udp_port = parse_num(&arg, it.next())?,
            "--tcp-port" => p.tcp_port = parse_num(&arg, it.next())?,
            "--interval" => p.interval_ms = parse_num(&arg, it.next())?,
            "--no-sync" => p.sync = false,
            _ if arg.starts_with("--monitor=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        p.monitor = v.to_string();
                    }
                }
            }
            _ => return Err(format!("Unexpected argument {arg:?}. {USAGE}")),
        }
    }
    Ok(p)
}

async fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving monitor {host}"))?
        .next()
        .with_context(|| format!("monitor {host} has no address"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let address = match parsed.address {
        Some(a) => a,
        None => hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string()),
    };
    let node = Arc::new(MonitorNode::new(address));
    node.set_status(parsed.status);
    node.set_neighbours(&parsed.neighbours);

    let udp_target = resolve(&parsed.monitor, parsed.udp_port).await?;
    let mut opts = ReporterOptions::new(udp_target.ip());
    opts.udp_target = udp_target;
    opts.tcp_target = SocketAddr::new(udp_target.ip(), parsed.tcp_port);
    opts.interval = Duration::from_millis(parsed.interval_ms.max(1));
    opts.sync_time = parsed.sync;

    let reporter = start_monitor(Arc::clone(&node), opts).await?;
    info!(node = node.address(), monitor = %udp_target, "reporting");

    tokio::signal::ctrl_c().await?;
    reporter.stop();
    Ok(())
}
