//! Graph endpoint: WebSocket upgrade and per-connection handler, plus a plain
//! HTTP snapshot route.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::graph::Graph;
use crate::state::AppState;

/// A request from a graph viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RequestGraph,
    SetDelay(i64),
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum JsonCommand {
    #[serde(rename = "reqData")]
    ReqData,
    #[serde(rename = "delay")]
    Delay { value: i64 },
}

/// Accepts `reqData`, `delay:<ms>`, or the JSON forms
/// `{"type":"reqData"}` / `{"type":"delay","value":<ms>}`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if text == "reqData" {
        return Some(Command::RequestGraph);
    }
    if let Some(v) = text.strip_prefix("delay:") {
        return v.trim().parse().ok().map(Command::SetDelay);
    }
    match serde_json::from_str::<JsonCommand>(text).ok()? {
        JsonCommand::ReqData => Some(Command::RequestGraph),
        JsonCommand::Delay { value } => Some(Command::SetDelay(value)),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/graph", get(graph_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Build a graph and log whatever had to be left out of it.
pub fn current_graph(state: &AppState) -> Graph {
    let out = state.graph.build_graph();
    for e in &out.skipped {
        warn!("graph build skipped a node: {e}");
    }
    out.graph
}

async fn graph_handler(State(state): State<AppState>) -> Json<Graph> {
    Json(current_graph(&state))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    /// Connected graph viewers.
    pub viewers: usize,
    /// Sources that have reported at least once.
    pub sources: Vec<String>,
}

async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        viewers: state.client_count.load(Ordering::Relaxed),
        sources: state.store.sources(),
    })
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let viewers = state.client_count.fetch_add(1, Ordering::Relaxed) + 1;
    info!(viewers, "graph viewer connected");

    // viewer count drops with the connection
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            let viewers = self.0.client_count.fetch_sub(1, Ordering::Relaxed) - 1;
            info!(viewers, "graph viewer disconnected");
        }
    }
    let _guard = ClientGuard(state.clone());

    let (mut tx, mut rx) = socket.split();
    while let Some(Ok(msg)) = rx.next().await {
        match msg {
            Message::Text(text) => match parse_command(&text) {
                Some(Command::RequestGraph) => {
                    let graph = current_graph(&state);
                    match serde_json::to_string(&graph) {
                        Ok(js) => {
                            if tx.send(Message::Text(js)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("serializing graph failed: {e}"),
                    }
                }
                Some(Command::SetDelay(ms)) => {
                    debug!(delay_ms = ms, "viewer set extra delay");
                    state.graph.set_delay(ms);
                }
                None => debug!("ignoring unknown viewer message: {text}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
}
