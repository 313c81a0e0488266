//! Error types for the sink crate.
//!
//! This module provides a unified error type for all bulk sink operations.

mod sink_error;

pub use sink_error::SinkError;
