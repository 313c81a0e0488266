//! Bulk-staging message handler backed by a sink provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::client::LogRecord;
use crate::failed_events;
use crate::handler::{HandlerError, MessageHandler, MessageTransformer};
use stream_indexer_sink::{BulkSinkProvider, SinkDocument};

/// Stages transformed records and posts them as one bulk request.
pub struct BulkSinkHandler {
    transformer: Box<dyn MessageTransformer>,
    sink: Arc<dyn BulkSinkProvider>,
    partition: i32,
    staged: Vec<SinkDocument>,
}

impl BulkSinkHandler {
    /// Create a handler for one partition.
    pub fn new(
        transformer: Box<dyn MessageTransformer>,
        sink: Arc<dyn BulkSinkProvider>,
        partition: i32,
    ) -> Self {
        Self {
            transformer,
            sink,
            partition,
            staged: Vec::new(),
        }
    }

    /// Number of documents currently staged.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }
}

#[async_trait]
impl MessageHandler for BulkSinkHandler {
    fn prepare_for_post(&mut self, records: &[LogRecord]) -> i64 {
        let mut proposed_next_offset = 0;
        let mut dropped = 0usize;

        for record in records {
            match self.transformer.transform(record) {
                Ok(doc) => self.staged.push(doc),
                Err(e) => {
                    failed_events::record_dropped(self.partition, record.offset, &e.to_string());
                    dropped += 1;
                }
            }
            proposed_next_offset = record.offset + 1;
        }

        debug!(
            partition = self.partition,
            staged = self.staged.len(),
            dropped,
            proposed_next_offset,
            "Prepared batch for post"
        );
        proposed_next_offset
    }

    async fn post_to_sink(&mut self) -> Result<(), HandlerError> {
        // Take the buffer up front: the staged bulk is cleared on every
        // return path, success or failure.
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(());
        }

        let summary = self.sink.bulk_submit(&staged).await.map_err(|e| {
            if e.is_connectivity() {
                HandlerError::SinkUnreachable(e.to_string())
            } else {
                HandlerError::SinkData(e.to_string())
            }
        })?;

        if let Some(detail) = summary.detailed_error() {
            return Err(HandlerError::SinkData(detail));
        }

        debug!(
            partition = self.partition,
            count = summary.succeeded,
            "Posted bulk to sink"
        );
        Ok(())
    }
}
