use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0} is not a current neighbour")]
    UnknownNeighbour(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("clock handshake reply is missing `{0}`")]
    BadSyncReply(&'static str),
    #[error("clock handshake timed out")]
    SyncTimeout,
}
