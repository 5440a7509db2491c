//! Clock handshake client: estimates this node's offset from the monitor
//! clock with one PTP-style request/response exchange.

use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::NodeError;

#[derive(Debug, Deserialize)]
struct SyncReply {
    #[serde(default, deserialize_with = "de_millis")]
    time1d: Option<i64>,
    #[serde(default, deserialize_with = "de_millis")]
    time2: Option<i64>,
}

// Replies may carry longs as numbers or as strings like "1461000000000L".
fn de_millis<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Num(i64),
        Text(String),
    }
    Ok(match Option::<Millis>::deserialize(d)? {
        Some(Millis::Num(n)) => Some(n),
        Some(Millis::Text(s)) => s.trim().trim_end_matches('L').parse().ok(),
        None => None,
    })
}

/// Offset such that `monitor_time = local_time - offset`.
///
/// `t1`: local send, `t1d`: monitor receive, `t2`: monitor send,
/// `t2d`: local receive.
pub fn compute_offset(t1: i64, t1d: i64, t2: i64, t2d: i64) -> i64 {
    -((t1d - t1 - t2d + t2) / 2)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Run one handshake against the monitor's TCP responder.
pub async fn sync_time(monitor: SocketAddr, timeout: Duration) -> Result<i64, NodeError> {
    tokio::time::timeout(timeout, exchange(monitor))
        .await
        .map_err(|_| NodeError::SyncTimeout)?
}

async fn exchange(monitor: SocketAddr) -> Result<i64, NodeError> {
    let mut stream = TcpStream::connect(monitor).await?;
    let t1 = now_ms();
    stream.write_all(br#"{"type":"sync"}"#).await?;
    stream.flush().await?;

    let mut buf = Vec::with_capacity(256);
    stream.read_to_end(&mut buf).await?;
    let t2d = now_ms();

    let reply: SyncReply = serde_json::from_slice(&buf)?;
    let t1d = reply.time1d.ok_or(NodeError::BadSyncReply("time1d"))?;
    let t2 = reply.time2.ok_or(NodeError::BadSyncReply("time2"))?;
    let offset = compute_offset(t1, t1d, t2, t2d);
    debug!(t1, t1d, t2, t2d, offset, "clock handshake");
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_for_node_behind_monitor() {
        // monitor clock is 100ms ahead, zero latency
        let off = compute_offset(0, 100, 100, 0);
        assert_eq!(off, -100);
        assert_eq!(0 - off, 100);
    }

    #[test]
    fn symmetric_latency_cancels_out() {
        // monitor 40ms behind, 10ms each way, 2ms processing
        let t1 = 1_000;
        let t1d = t1 + 10 - 40;
        let t2 = t1d + 2;
        let t2d = t2 + 40 + 10;
        assert_eq!(compute_offset(t1, t1d, t2, t2d), 40);
    }

    #[test]
    fn reply_accepts_numeric_and_suffixed_strings() {
        let r: SyncReply = serde_json::from_str(r#"{"time1d":"15L","time2":20}"#).unwrap();
        assert_eq!((r.time1d, r.time2), (Some(15), Some(20)));
        let r: SyncReply = serde_json::from_str(r#"{"type":"sync"}"#).unwrap();
        assert_eq!(r.time1d, None);
    }
}
