//! UDP ingestion listener: one JSON report per datagram.

use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::report::decode_report;
use crate::store::MultiSourceStore;

/// Receive reports forever, feeding valid ones into `store`.
pub async fn run_udp_receiver(socket: UdpSocket, store: Arc<MultiSourceStore>, max_packet: usize) {
    let mut buf = vec![0u8; max_packet];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!("udp receive failed: {e}");
                continue;
            }
        };
        match decode_report(&buf[..n]) {
            Ok(sample) => {
                debug!(%peer, source = sample.source(), ts = sample.timestamp(), "report");
                store.insert(sample);
            }
            Err(e) => warn!(%peer, "dropping report: {e}"),
        }
    }
}
