//! Worker configuration and dependency initialization.

mod dependencies;

pub use dependencies::Dependencies;

use std::fmt;
use std::str::FromStr;

use crate::errors::IndexerError;

/// Where a worker starts reading when it has no in-memory cursor yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialOffsetPolicy {
    /// Start at the partition's earliest retained offset.
    Earliest,
    /// Start at the partition's latest offset (new records only).
    Latest,
    /// Resume from the consumer group's committed offset, falling back to
    /// earliest when the group has never committed.
    LastCommitted,
}

impl FromStr for InitialOffsetPolicy {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            "last-committed" | "last_committed" => Ok(Self::LastCommitted),
            other => Err(IndexerError::config(format!(
                "Invalid initial offset policy '{}' (expected earliest, latest, or last-committed)",
                other
            ))),
        }
    }
}

impl fmt::Display for InitialOffsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
            Self::LastCommitted => "last-committed",
        };
        write!(f, "{}", name)
    }
}

/// Validated configuration for one indexing worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Log topic this worker subscribes to.
    pub topic: String,
    /// Partition index; one worker per partition.
    pub partition: i32,
    /// Consumer group identity for committed offsets.
    pub consumer_group: String,
    /// Delay between successful rounds, in milliseconds.
    pub sleep_between_fetches_ms: u64,
    /// When true: stage but never post or commit.
    pub dry_run: bool,
    /// When true: emit per-step timing diagnostics.
    pub perf_reporting: bool,
    /// Policy for the first offset determination.
    pub initial_offset_policy: InitialOffsetPolicy,
}

impl WorkerConfig {
    /// Check the configuration for values a worker cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.topic.is_empty() {
            return Err(IndexerError::config("topic must not be empty"));
        }
        if self.consumer_group.is_empty() {
            return Err(IndexerError::config("consumer group must not be empty"));
        }
        if self.partition < 0 {
            return Err(IndexerError::config(format!(
                "partition must be non-negative, got {}",
                self.partition
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> WorkerConfig {
        WorkerConfig {
            topic: "events".to_string(),
            partition: 0,
            consumer_group: "stream-indexer".to_string(),
            sleep_between_fetches_ms: 1000,
            dry_run: false,
            perf_reporting: false,
            initial_offset_policy: InitialOffsetPolicy::LastCommitted,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_topic_rejected() {
        let mut config = valid_config();
        config.topic = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_partition_rejected() {
        let mut config = valid_config();
        config.partition = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "earliest".parse::<InitialOffsetPolicy>().unwrap(),
            InitialOffsetPolicy::Earliest
        );
        assert_eq!(
            "Latest".parse::<InitialOffsetPolicy>().unwrap(),
            InitialOffsetPolicy::Latest
        );
        assert_eq!(
            "last-committed".parse::<InitialOffsetPolicy>().unwrap(),
            InitialOffsetPolicy::LastCommitted
        );
        assert!("sometime".parse::<InitialOffsetPolicy>().is_err());
    }
}
