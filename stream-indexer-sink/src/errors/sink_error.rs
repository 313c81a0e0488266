//! Sink error types.
//!
//! This module defines the unified error type for all bulk sink operations.
//! The worker's recovery policy depends on the split between connectivity
//! errors (retryable end-to-end) and data-level errors (log and skip), so
//! every constructor here commits to one side of that split.

use thiserror::Error;

/// Unified errors from bulk sink operations.
///
/// `Unreachable` is the connectivity class: the backend could not be reached
/// or did not produce a usable response, and the same batch may succeed if
/// resubmitted later. All other variants are data-level: resubmitting the
/// same batch will fail the same way.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The backend could not be reached (transport failure, 5xx, timeout).
    #[error("Sink unreachable: {0}")]
    Unreachable(String),

    /// The backend rejected the request at the data level (4xx, mapping
    /// conflicts, malformed actions).
    #[error("Bulk request rejected: {0}")]
    Rejected(String),

    /// Failed to serialize documents into a bulk body.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failed to create or verify the search index.
    #[error("Index creation error: {0}")]
    IndexCreation(String),
}

impl SinkError {
    /// Create an unreachable error.
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Create a rejected error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreation(msg.into())
    }

    /// Whether this error is in the connectivity class (retry the batch)
    /// rather than the data class (drop the batch).
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(SinkError::unreachable("connection refused").is_connectivity());
        assert!(!SinkError::rejected("mapper_parsing_exception").is_connectivity());
        assert!(!SinkError::serialization("bad utf8").is_connectivity());
        assert!(!SinkError::index_creation("exists with wrong mapping").is_connectivity());
    }
}
