//! End-to-end checks of the monitor adapters on loopback sockets.
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use meshmon::buffer::BufferLimits;
use meshmon::graph::{GraphSettings, GraphSynthesizer};
use meshmon::receiver::run_udp_receiver;
use meshmon::sample::{Neighbour, Payload, Sample};
use meshmon::state::AppState;
use meshmon::store::MultiSourceStore;
use meshmon::sync::run_sync_responder;
use meshmon::ws::router;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn state() -> AppState {
    let store = Arc::new(MultiSourceStore::new(BufferLimits {
        capacity: 100,
        tolerance: 5_000,
        window: 10_000,
    }));
    let graph = GraphSynthesizer::new(
        Arc::clone(&store),
        GraphSettings {
            base_delay: 0,
            ..GraphSettings::default()
        },
    );
    AppState::new(store, graph)
}

async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn udp_reports_reach_the_store() {
    let st = state();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(run_udp_receiver(socket, Arc::clone(&st.store), 8096));

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let good = json!({"type": "data", "node": {
        "address": "n1", "status": "idle", "timeStamp": now_ms() - 10,
        "neighbours": [{"address": "n2", "bytesSend": 1, "bytesReceived": 2, "dataSend": 0}]
    }});
    sender.send_to(b"{garbage", addr).await.unwrap();
    sender.send_to(&serde_json::to_vec(&good).unwrap(), addr).await.unwrap();

    let store = Arc::clone(&st.store);
    assert!(wait_for(|| store.sample_count("n1") == 1).await, "report never stored");
    assert_eq!(st.store.source_count(), 1);

    let graph = st.graph.build_graph().graph;
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.edges[0].id, "n1_:_n2");
}

#[tokio::test]
async fn clock_handshake_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_sync_responder(listener, 8096));

    let before = now_ms();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(br#"{"type":"sync"}"#).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let reply: Value = serde_json::from_slice(&buf).unwrap();

    let t1d = reply["time1d"].as_i64().unwrap();
    let t2 = reply["time2"].as_i64().unwrap();
    assert_eq!(reply["type"], "sync");
    assert!(before <= t1d && t1d <= t2 && t2 <= now_ms());
}

#[tokio::test]
async fn websocket_serves_graph_and_accepts_delay() {
    let st = state();
    st.store.insert(Sample::new(
        "a",
        now_ms() - 10,
        Payload::new("processing", vec![Neighbour::new("b", 10, 0, true)]),
    ));
    st.store.insert(Sample::new(
        "b",
        now_ms() - 10,
        Payload::new("idle", vec![Neighbour::new("a", 5, 10, false)]),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(st.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.expect("connect ws");
    ws.send(Message::Text("reqData".into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("graph reply in time");
    let text = match reply {
        Some(Ok(Message::Text(t))) => t,
        other => panic!("unexpected frame {other:?}"),
    };
    let graph: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    let edges = graph["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["id"], "a_:_b");
    assert_eq!(edges[0]["toSend"], 5);

    ws.send(Message::Text(r#"{"type":"delay","value":750}"#.into()))
        .await
        .unwrap();
    let g = Arc::clone(&st.graph);
    assert!(wait_for(|| g.delay() == 750).await, "delay not applied");
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> Value {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("HTTP/1.1 200"), "{text}");
    let (_, body) = text.split_once("\r\n\r\n").expect("http body");
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn http_graph_and_health_routes() {
    let st = state();
    st.store.insert(Sample::new(
        "a",
        now_ms() - 10,
        Payload::new("idle", vec![Neighbour::new("b", 3, 4, false)]),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(st.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let graph = http_get(addr, "/graph").await;
    assert_eq!(graph["nodes"][0]["id"], "a");
    assert_eq!(graph["edges"][0]["id"], "a_:_b");
    assert_eq!(graph["edges"][0]["fromSend"], 3);
    assert!(graph["timestamp"].as_str().unwrap().contains(':'));

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.expect("connect ws");
    let counter = Arc::clone(&st.client_count);
    assert!(
        wait_for(|| counter.load(std::sync::atomic::Ordering::Relaxed) == 1).await,
        "viewer not counted"
    );
    let health = http_get(addr, "/health").await;
    assert_eq!(health, json!({"status": "ok", "viewers": 1, "sources": ["a"]}));

    ws.close(None).await.unwrap();
    assert!(
        wait_for(|| counter.load(std::sync::atomic::Ordering::Relaxed) == 0).await,
        "viewer not released"
    );
}
