//! # Stream Indexer
//!
//! Indexes a partitioned, offset-addressed log (Kafka) into a full-text
//! search backend (OpenSearch), one independent worker per partition.
//!
//! ## Architecture
//!
//! Each worker drives a sequential round pipeline:
//!
//! 1. **Fetch**: read a record batch from the partition at the cursor
//! 2. **Stage**: transform records into documents and buffer them
//! 3. **Post**: submit the buffer as one bulk request to the sink
//! 4. **Commit**: persist the advanced offset at the log broker
//!
//! Offsets commit only after the sink acknowledged the batch (or rejected
//! it at the data level), giving at-least-once delivery with best-effort
//! dedup via offsets.
//!
//! ## Modules
//!
//! - [`client`]: log broker abstraction and the Kafka implementation
//! - [`config`]: worker configuration and dependency initialization
//! - [`handler`]: transform-and-stage message handling
//! - [`worker`]: the per-partition indexing worker
//! - [`status`]: lifecycle status observable by supervisors
//! - [`supervisor`]: spawns and shuts down the worker set
//! - [`failed_events`]: dedicated log for dropped records
//! - [`errors`]: error taxonomy for the worker and bootstrap

pub mod client;
pub mod config;
pub mod errors;
pub mod failed_events;
pub mod handler;
pub mod status;
pub mod supervisor;
pub mod worker;

pub use config::{Dependencies, InitialOffsetPolicy, WorkerConfig};
pub use errors::{IndexerError, WorkerError};
pub use status::{JobStatus, JobStatusHandle, LifecycleState, ShutdownHandle};
pub use supervisor::Supervisor;
pub use worker::IndexerWorker;
