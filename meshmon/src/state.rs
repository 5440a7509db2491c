//! Shared monitor state handed to every adapter task.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::graph::GraphSynthesizer;
use crate::store::MultiSourceStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MultiSourceStore>,
    pub graph: Arc<GraphSynthesizer>,

    // Connected graph viewers
    pub client_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(store: Arc<MultiSourceStore>, graph: GraphSynthesizer) -> Self {
        Self {
            store,
            graph: Arc::new(graph),
            client_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}
