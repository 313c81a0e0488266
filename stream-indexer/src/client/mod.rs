//! Log broker abstraction for the indexing worker.
//!
//! Defines the `LogClient` trait the worker drives, the record/batch types
//! that cross it, and the pre-classified error type the recovery policy is
//! keyed on. The Kafka implementation lives in [`kafka`].

mod kafka;

pub use kafka::{KafkaClientConfig, KafkaLogClient};

use async_trait::async_trait;
use thiserror::Error;

/// A single record fetched from the log.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Position of this record in its partition.
    pub offset: i64,
    /// Optional record key.
    pub key: Option<Vec<u8>>,
    /// Record payload bytes.
    pub payload: Vec<u8>,
}

/// Broker-reported fetch problem, surfaced in-band so the round can decide
/// between rebasing the cursor and escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorCode {
    /// The requested offset is outside the partition's retained range.
    OffsetOutOfRange,
    /// The topic or partition does not exist on the broker.
    UnknownTopicOrPartition,
}

/// One fetch response: either a (possibly empty) run of records or a broker
/// error code.
#[derive(Debug, Clone)]
pub struct FetchBatch {
    /// Broker error for this fetch, when one occurred.
    pub error: Option<FetchErrorCode>,
    /// Records in log order, starting at the requested offset.
    pub records: Vec<LogRecord>,
    /// Total key + payload bytes across `records`.
    pub valid_bytes: usize,
}

impl FetchBatch {
    /// A batch built from records, with byte accounting.
    pub fn from_records(records: Vec<LogRecord>) -> Self {
        let valid_bytes = records
            .iter()
            .map(|r| r.payload.len() + r.key.as_ref().map_or(0, Vec::len))
            .sum();
        Self {
            error: None,
            records,
            valid_bytes,
        }
    }

    /// A batch carrying only a broker error code.
    pub fn from_error(code: FetchErrorCode) -> Self {
        Self {
            error: Some(code),
            records: Vec::new(),
            valid_bytes: 0,
        }
    }
}

/// Errors from the log client, classified at the source.
///
/// The worker's policy is keyed entirely on this split: `Recoverable` earns
/// one reconnect attempt per round, `Fatal` terminates the worker.
#[derive(Debug, Clone, Error)]
pub enum LogClientError {
    /// Transient failure; a reconnect may clear it.
    #[error("Recoverable log client error: {0}")]
    Recoverable(String),

    /// Permanent failure; reconnecting will not help.
    #[error("Fatal log client error: {0}")]
    Fatal(String),
}

impl LogClientError {
    /// Create a recoverable error.
    pub fn recoverable(msg: impl Into<String>) -> Self {
        Self::Recoverable(msg.into())
    }

    /// Create a fatal error.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

/// Connection to one partition of the log broker.
///
/// The worker owns its client exclusively and drives it sequentially, so
/// methods take `&mut self`. Implementations must enforce their own
/// operation deadlines; the worker does not wrap calls in timeouts.
#[async_trait]
pub trait LogClient: Send {
    /// Resolve the first offset to consume, per the configured policy
    /// (earliest, latest, or the group's last committed offset).
    async fn compute_initial_offset(&mut self) -> Result<i64, LogClientError>;

    /// Fetch a batch of records starting at `offset`.
    async fn fetch(&mut self, offset: i64) -> Result<FetchBatch, LogClientError>;

    /// React to a broker error code returned by a fetch.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(offset))` - The cursor should be rebased to `offset`
    /// * `Ok(None)` - Nothing to rebase; retry the same offset
    /// * `Err(LogClientError)` - The error escalates to the recovery policy
    async fn handle_fetch_error(
        &mut self,
        code: FetchErrorCode,
        offset: i64,
    ) -> Result<Option<i64>, LogClientError>;

    /// The partition's current latest offset (high watermark).
    async fn latest_offset(&mut self) -> Result<i64, LogClientError>;

    /// Persist `offset` as the consumer group's progress marker.
    async fn commit_offset(&mut self, offset: i64) -> Result<(), LogClientError>;

    /// Re-establish the broker session after a recoverable failure.
    async fn reconnect(&mut self) -> Result<(), LogClientError>;

    /// Release the connection. Idempotent.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_byte_accounting() {
        let batch = FetchBatch::from_records(vec![
            LogRecord {
                offset: 7,
                key: Some(b"k".to_vec()),
                payload: b"payload".to_vec(),
            },
            LogRecord {
                offset: 8,
                key: None,
                payload: b"xy".to_vec(),
            },
        ]);
        assert_eq!(batch.valid_bytes, 10);
        assert!(batch.error.is_none());
    }

    #[test]
    fn test_error_batch_is_empty() {
        let batch = FetchBatch::from_error(FetchErrorCode::OffsetOutOfRange);
        assert_eq!(batch.valid_bytes, 0);
        assert!(batch.records.is_empty());
        assert_eq!(batch.error, Some(FetchErrorCode::OffsetOutOfRange));
    }
}
