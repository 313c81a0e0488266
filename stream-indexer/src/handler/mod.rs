//! Message handling: transform, stage, and post to the sink.
//!
//! The worker drives a [`MessageHandler`] through two steps per round:
//! staging (transform records into documents and buffer them) and posting
//! (submit the buffered documents as one bulk request). The handler owns
//! the sink connection lifecycle; the worker only interprets the classified
//! outcome.

mod bulk;
mod transform;

pub use bulk::BulkSinkHandler;
pub use transform::{MessageTransformer, RawJsonTransformer, TransformError};

use async_trait::async_trait;
use thiserror::Error;

use crate::client::LogRecord;

/// Errors from posting a staged batch, classified for the worker's policy.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The sink could not be reached; the batch should be retried
    /// end-to-end from the same offset.
    #[error("Sink unreachable: {0}")]
    SinkUnreachable(String),

    /// The sink rejected records at the data level; the detailed message
    /// names the rejected items. The batch should be skipped, not retried.
    #[error("Sink rejected records: {0}")]
    SinkData(String),
}

/// Transforms fetched records and posts them to the sink in bulk.
#[async_trait]
pub trait MessageHandler: Send {
    /// Transform and stage a batch of records.
    ///
    /// Individually bad records are logged to the failed-events target and
    /// skipped; staging always advances past every record seen. Callers
    /// pass at least one record.
    ///
    /// # Returns
    ///
    /// The offset immediately past the last record processed, whether or
    /// not it was staged.
    fn prepare_for_post(&mut self, records: &[LogRecord]) -> i64;

    /// Submit the staged batch to the sink as one bulk request.
    ///
    /// The staged buffer is cleared before returning on every path, so a
    /// retry after `SinkUnreachable` starts from a fresh staging pass.
    async fn post_to_sink(&mut self) -> Result<(), HandlerError>;
}
