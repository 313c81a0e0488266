//! Bulk sink provider trait definition.
//!
//! This module defines the abstract interface for bulk document submission,
//! allowing for different backend implementations (OpenSearch, Elasticsearch,
//! etc.).

use async_trait::async_trait;

use crate::errors::SinkError;
use crate::types::{BulkSummary, SinkDocument};

/// Abstracts the underlying search backend (OpenSearch, Elasticsearch, etc.).
///
/// Implementations are injected into the message handler so that the indexing
/// pipeline can be tested against mock backends. All methods return
/// `Result<T, SinkError>`; implementations are responsible for classifying
/// failures as connectivity-level (`SinkError::Unreachable`) or data-level,
/// since the indexing worker's retry policy is driven by that split.
///
/// Implementations must enforce their own request deadlines: the worker does
/// not impose a timeout around submissions.
#[async_trait]
pub trait BulkSinkProvider: Send + Sync {
    /// Check that the backend is reachable.
    ///
    /// Called during startup before any worker is spawned.
    async fn check_ready(&self) -> Result<(), SinkError>;

    /// Ensure the target index exists, creating it if necessary.
    ///
    /// Called during startup, after `check_ready`.
    async fn ensure_index_exists(&self) -> Result<(), SinkError>;

    /// Submit a batch of documents in one bulk request.
    ///
    /// An empty batch returns an empty successful summary without touching
    /// the backend.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkSummary)` - The request reached the backend; the summary
    ///   reports per-item acceptance, which may include rejections
    /// * `Err(SinkError)` - The request failed as a whole
    async fn bulk_submit(&self, documents: &[SinkDocument]) -> Result<BulkSummary, SinkError>;
}
