//! Per-record transformation from log bytes to sink documents.

use thiserror::Error;

use crate::client::LogRecord;
use stream_indexer_sink::SinkDocument;

/// Errors from transforming one record.
///
/// Transform failures never abort a batch; the handler logs the record to
/// the failed-events target and moves on.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// The payload is not valid UTF-8.
    #[error("Invalid UTF-8 payload: {0}")]
    InvalidUtf8(String),

    /// The payload is not valid JSON.
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),
}

/// Pluggable per-record transform.
///
/// Implementations turn one raw log record into one sink document. They are
/// free to keep state across records within a batch (lookup caches,
/// counters), which is why `transform` takes `&mut self`.
pub trait MessageTransformer: Send {
    fn transform(&mut self, record: &LogRecord) -> Result<SinkDocument, TransformError>;
}

/// Passes JSON payloads through unchanged.
///
/// The record key, when present and valid UTF-8, becomes the document id so
/// that re-deliveries of the same record overwrite rather than duplicate.
#[derive(Debug, Default)]
pub struct RawJsonTransformer;

impl RawJsonTransformer {
    pub fn new() -> Self {
        Self
    }
}

impl MessageTransformer for RawJsonTransformer {
    fn transform(&mut self, record: &LogRecord) -> Result<SinkDocument, TransformError> {
        let text = std::str::from_utf8(&record.payload)
            .map_err(|e| TransformError::InvalidUtf8(e.to_string()))?;
        let source: serde_json::Value =
            serde_json::from_str(text).map_err(|e| TransformError::InvalidJson(e.to_string()))?;

        let doc = match record.key.as_deref().map(std::str::from_utf8) {
            Some(Ok(key)) => SinkDocument::with_id(key, source),
            _ => SinkDocument::new(source),
        };
        Ok(doc)
    }
}
