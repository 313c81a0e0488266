//! Interface definitions for the bulk sink provider.
//!
//! This module defines the abstract `BulkSinkProvider` trait that allows
//! for dependency injection and swappable search backend implementations.

mod bulk_sink;

pub use bulk_sink::BulkSinkProvider;
