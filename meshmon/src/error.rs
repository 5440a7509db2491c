//! Error types for the ingestion adapters and graph synthesis.

use thiserror::Error;

/// Why an inbound report was refused before reaching the store.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("report is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported report type {0:?}")]
    UnsupportedType(Option<String>),
    #[error("report is missing `{0}`")]
    MissingField(&'static str),
    #[error("report field `{field}` is malformed: {reason}")]
    MalformedField { field: &'static str, reason: String },
}

/// A node left out of a graph build. Never aborts the whole build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("malformed payload from {source_id}: {reason}")]
    MalformedPayload { source_id: String, reason: String },
}

/// Failure while answering a clock handshake.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request is not a sync request")]
    NotSync,
    #[error("connection closed before a request arrived")]
    Empty,
}
