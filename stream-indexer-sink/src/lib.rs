//! # Stream Indexer Sink
//!
//! This crate provides traits and implementations for the search backend the
//! indexer posts to. It includes definitions for errors, interfaces, and a
//! concrete implementation for OpenSearch.

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use errors::SinkError;
pub use interfaces::BulkSinkProvider;
pub use opensearch::OpenSearchSink;
pub use types::{BulkItemResult, BulkSummary, SinkDocument};
