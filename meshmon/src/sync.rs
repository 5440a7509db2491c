//! Clock handshake responder.
//!
//! A node connects over TCP, sends `{"type":"sync"}`, and gets the request
//! echoed back stamped with the monitor's receive and send times. The node
//! derives its clock offset from those; the monitor keeps no state.

use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::error::SyncError;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build the reply to a handshake request received at `received_ms`.
pub fn sync_reply(request: &[u8], received_ms: i64, send_ms: i64) -> Result<Value, SyncError> {
    let mut req: Value = serde_json::from_slice(request)?;
    let obj = req.as_object_mut().ok_or(SyncError::NotSync)?;
    if obj.get("type").and_then(Value::as_str) != Some("sync") {
        return Err(SyncError::NotSync);
    }
    obj.insert("time1".into(), json!(received_ms));
    obj.insert("time1d".into(), json!(received_ms));
    obj.insert("time2".into(), json!(send_ms));
    Ok(req)
}

/// Accept handshakes forever, one task per connection.
pub async fn run_sync_responder(listener: TcpListener, max_packet: usize) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                warn!("sync accept failed: {e}");
                continue;
            }
        };
        tokio::spawn(async move {
            if let Err(e) = handle_sync(stream, peer, max_packet).await {
                warn!(%peer, "clock handshake failed: {e}");
            }
        });
    }
}

async fn handle_sync(mut stream: TcpStream, peer: SocketAddr, max_packet: usize) -> Result<(), SyncError> {
    let mut buf = vec![0u8; max_packet];
    let n = stream.read(&mut buf).await?;
    let received = now_ms();
    if n == 0 {
        return Err(SyncError::Empty);
    }
    let reply = sync_reply(&buf[..n], received, now_ms())?;
    stream.write_all(&serde_json::to_vec(&reply)?).await?;
    stream.shutdown().await?;
    debug!(%peer, received, "answered clock handshake");
    Ok(())
}
