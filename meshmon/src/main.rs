//! meshmon: monitor service. Receives node reports over UDP, answers clock
//! handshakes over TCP, and serves the live graph over WebSocket.

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;
use tracing_subscriber::EnvFilter;

use meshmon::config::MonitorConfig;
use meshmon::graph::GraphSynthesizer;
use meshmon::receiver::run_udp_receiver;
use meshmon::state::AppState;
use meshmon::store::MultiSourceStore;
use meshmon::sync::run_sync_responder;
use meshmon::ws::router;

const USAGE: &str = "Usage: meshmon [--config PATH|-c PATH] [--port UI_PORT|-p UI_PORT]";

#[derive(Debug, Default)]
struct ParsedArgs {
    config: Option<PathBuf>,
    ui_port: Option<u16>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut parsed = ParsedArgs::default();
    while let Some(a) = it.next() {
        match a.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--config" | "-c" => parsed.config = it.next().map(PathBuf::from),
            "--port" | "-p" => {
                let v = it.next().unwrap_or_default();
                parsed.ui_port = Some(v.parse().map_err(|_| format!("invalid port {v:?}\n{USAGE}"))?);
            }
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    parsed.ui_port = Some(v.parse().map_err(|_| format!("invalid port {v:?}\n{USAGE}"))?);
                }
            }
            _ if a.starts_with("--config=") => {
                if let Some((_, v)) = a.split_once('=') {
                    if !v.is_empty() {
                        parsed.config = Some(PathBuf::from(v));
                    }
                }
            }
            _ => return Err(format!("Unexpected argument {a:?}. {USAGE}")),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(std::env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = MonitorConfig::load(parsed.config.as_deref())?;
    config.apply_env();
    if let Some(p) = parsed.ui_port {
        config.ui_port = p;
    }

    let store = Arc::new(MultiSourceStore::new(config.buffer_limits()));
    let graph = GraphSynthesizer::new(Arc::clone(&store), config.graph_settings());
    let state = AppState::new(Arc::clone(&store), graph);

    let udp_addr: SocketAddr = format!("{}:{}", config.ip, config.udp_port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.ip))?;
    let tcp_addr = SocketAddr::new(udp_addr.ip(), config.tcp_port);

    let udp = UdpSocket::bind(udp_addr)
        .await
        .with_context(|| format!("binding report listener on {udp_addr}"))?;
    let sync = TcpListener::bind(tcp_addr)
        .await
        .with_context(|| format!("binding clock handshake on {tcp_addr}"))?;
    info!("receiving reports on udp://{udp_addr}, clock handshake on tcp://{tcp_addr}");

    tokio::spawn(run_udp_receiver(udp, Arc::clone(&store), config.udp_max_packet_size));
    let tcp_max = config.tcp_max_packet_size;
    tokio::spawn(async move {
        if let Err(e) = run_sync_responder(sync, tcp_max).await {
            tracing::error!("clock handshake responder stopped: {e}");
        }
    });

    let ui_addr = SocketAddr::from(([0, 0, 0, 0], config.ui_port));
    let listener = TcpListener::bind(ui_addr)
        .await
        .with_context(|| format!("binding graph endpoint on {ui_addr}"))?;
    info!("Monitor service started; graph at ws://{}/ws", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
