//! Dedicated log for records dropped from the pipeline.
//!
//! Dropped data is the one thing operators may need to replay by hand, so
//! it goes to its own tracing target where it can be routed to a separate
//! appender or retention policy. One entry per dropped record (transform
//! failures) or per dropped batch segment (sink data rejections).

use tracing::error;

/// Tracing target for dropped-event entries.
pub const FAILED_EVENTS_TARGET: &str = "failed_events";

/// Record a single dropped record.
pub fn record_dropped(partition: i32, offset: i64, reason: &str) {
    error!(
        target: FAILED_EVENTS_TARGET,
        partition,
        offset,
        reason = %reason,
        "Dropped record"
    );
}

/// Record a dropped batch segment spanning `[first_offset, last_offset]`.
pub fn batch_dropped(partition: i32, first_offset: i64, last_offset: i64, reason: &str) {
    error!(
        target: FAILED_EVENTS_TARGET,
        partition,
        first_offset,
        last_offset,
        reason = %reason,
        "Dropped batch segment"
    );
}
