//! Report sender: optional clock handshake, then samplers plus one UDP
//! datagram per interval.

use once_cell::sync::OnceCell;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::clock::sync_time;
use crate::error::NodeError;
use crate::node::MonitorNode;
use crate::sampler::{spawn_cpu_sampler, spawn_io_sampler, spawn_process_sampler, SAMPLE_PERIOD};

#[derive(Debug, Clone)]
pub struct ReporterOptions {
    /// Monitor's report listener.
    pub udp_target: SocketAddr,
    /// Monitor's clock handshake responder.
    pub tcp_target: SocketAddr,
    pub interval: Duration,
    pub sync_time: bool,
    pub sync_timeout: Duration,
}

impl ReporterOptions {
    pub fn new(monitor: IpAddr) -> Self {
        Self {
            udp_target: SocketAddr::new(monitor, 7000),
            tcp_target: SocketAddr::new(monitor, 7001),
            interval: Duration::from_millis(500),
            sync_time: true,
            sync_timeout: Duration::from_secs(3),
        }
    }
}

/// Running reporter tasks. Dropping it does not stop them; call [`stop`].
///
/// [`stop`]: Reporter::stop
pub struct Reporter {
    tasks: Vec<JoinHandle<()>>,
}

impl Reporter {
    pub fn stop(self) {
        for t in self.tasks {
            t.abort();
        }
    }
}

// Runtime toggle (read once); MESHMON_NODE_CPU=0 skips sysinfo polling
fn cpu_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("MESHMON_NODE_CPU")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

pub async fn send_report(socket: &UdpSocket, node: &MonitorNode, target: SocketAddr) -> Result<usize, NodeError> {
    let bytes = serde_json::to_vec(&node.data_report())?;
    Ok(socket.send_to(&bytes, target).await?)
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

pub fn spawn_sender(node: Arc<MonitorNode>, socket: UdpSocket, target: SocketAddr, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = send_report(&socket, &node, target).await {
                warn!("data couldn't be sent: {e}");
            }
        }
    })
}

/// Sync the clock (if enabled), then start the samplers and the sender.
/// A failed handshake is logged and reporting proceeds with offset 0.
pub async fn start_monitor(node: Arc<MonitorNode>, opts: ReporterOptions) -> Result<Reporter, NodeError> {
    if opts.sync_time {
        match sync_time(opts.tcp_target, opts.sync_timeout).await {
            Ok(offset) => {
                info!(offset_ms = offset, "clock synchronized with monitor");
                node.set_monitor_offset(offset);
            }
            Err(e) => warn!("time synchronization failed: {e}"),
        }
    }

    let socket = UdpSocket::bind(unspecified_for(opts.udp_target)).await?;
    let mut tasks = vec![
        spawn_io_sampler(Arc::clone(&node), SAMPLE_PERIOD),
        spawn_process_sampler(Arc::clone(&node), SAMPLE_PERIOD),
    ];
    if cpu_enabled() {
        tasks.push(spawn_cpu_sampler(Arc::clone(&node), SAMPLE_PERIOD));
    }
    tasks.push(spawn_sender(node, socket, opts.udp_target, opts.interval));
    Ok(Reporter { tasks })
}
