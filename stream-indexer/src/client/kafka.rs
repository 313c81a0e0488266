//! Kafka implementation of the log client.
//!
//! Uses an assigned-partition consumer: the supervisor decides which
//! partition each worker owns, so there is no consumer-group rebalancing.
//! Offsets are committed manually against the configured group, and
//! `auto.offset.reset` is set to `error` so an out-of-range position
//! surfaces as a classified fetch error instead of a silent reset.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    message::Message,
    types::RDKafkaErrorCode,
    Offset, TopicPartitionList,
};
use tracing::{debug, info, warn};

use crate::client::{FetchBatch, FetchErrorCode, LogClient, LogClientError, LogRecord};
use crate::config::InitialOffsetPolicy;

/// Connection settings for [`KafkaLogClient`].
///
/// Retained across reconnects so the session can be rebuilt from scratch.
#[derive(Debug, Clone)]
pub struct KafkaClientConfig {
    /// Broker addresses, comma-separated.
    pub brokers: String,
    /// Topic to consume.
    pub topic: String,
    /// Partition this client is bound to.
    pub partition: i32,
    /// Consumer group used for committed offsets.
    pub group: String,
    /// Policy for resolving the initial offset and rebasing after an
    /// out-of-range fetch.
    pub initial_offset_policy: InitialOffsetPolicy,
    /// Maximum records returned by one fetch.
    pub fetch_max_records: usize,
    /// How long one fetch waits for the first/next message.
    pub poll_timeout: Duration,
    /// Deadline for metadata operations (watermarks, committed offsets,
    /// commits).
    pub metadata_timeout: Duration,
}

/// Assigned-partition Kafka consumer implementing [`LogClient`].
pub struct KafkaLogClient {
    config: KafkaClientConfig,
    consumer: Option<StreamConsumer>,
}

impl KafkaLogClient {
    /// Create a client and establish the broker session.
    pub fn new(config: KafkaClientConfig) -> Result<Self, LogClientError> {
        let consumer = Self::build_consumer(&config)?;
        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            partition = config.partition,
            group = %config.group,
            "Created Kafka log client"
        );
        Ok(Self {
            config,
            consumer: Some(consumer),
        })
    }

    fn build_consumer(config: &KafkaClientConfig) -> Result<StreamConsumer, LogClientError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "error")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| LogClientError::recoverable(e.to_string()))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&config.topic, config.partition);
        consumer
            .assign(&tpl)
            .map_err(|e| LogClientError::recoverable(e.to_string()))?;

        Ok(consumer)
    }

    fn consumer(&self) -> Result<&StreamConsumer, LogClientError> {
        self.consumer
            .as_ref()
            .ok_or_else(|| LogClientError::fatal("log client is closed"))
    }

    /// Restart fetching at `offset` by re-assigning the partition with an
    /// explicit position.
    fn position_at(&self, offset: i64) -> Result<(), LogClientError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.config.topic, self.config.partition, Offset::Offset(offset))
            .map_err(|e| LogClientError::recoverable(e.to_string()))?;
        self.consumer()?
            .assign(&tpl)
            .map_err(|e| LogClientError::recoverable(format!("assign at {} failed: {}", offset, e)))
    }

    fn watermarks(&self) -> Result<(i64, i64), LogClientError> {
        self.consumer()?
            .fetch_watermarks(
                &self.config.topic,
                self.config.partition,
                self.config.metadata_timeout,
            )
            .map_err(|e| LogClientError::recoverable(e.to_string()))
    }

    /// Errors the round handles in-band via its error-code path.
    fn fetch_error_code(err: &KafkaError) -> Option<FetchErrorCode> {
        match err.rdkafka_error_code() {
            Some(RDKafkaErrorCode::OffsetOutOfRange) => Some(FetchErrorCode::OffsetOutOfRange),
            Some(RDKafkaErrorCode::UnknownTopicOrPartition) => {
                Some(FetchErrorCode::UnknownTopicOrPartition)
            }
            _ => None,
        }
    }

    /// Everything that is not in-band becomes a classified client error.
    /// Unknown conditions default to recoverable so the worker's single
    /// reconnect attempt gets a chance before terminating.
    fn classify(err: KafkaError) -> LogClientError {
        match err.rdkafka_error_code() {
            Some(RDKafkaErrorCode::UnknownTopicOrPartition) => {
                LogClientError::fatal(err.to_string())
            }
            _ => LogClientError::recoverable(err.to_string()),
        }
    }
}

#[async_trait]
impl LogClient for KafkaLogClient {
    async fn compute_initial_offset(&mut self) -> Result<i64, LogClientError> {
        let (earliest, latest) = self.watermarks()?;
        let offset = match self.config.initial_offset_policy {
            InitialOffsetPolicy::Earliest => earliest,
            InitialOffsetPolicy::Latest => latest,
            InitialOffsetPolicy::LastCommitted => {
                let committed = self
                    .consumer()?
                    .committed(self.config.metadata_timeout)
                    .map_err(|e| LogClientError::recoverable(e.to_string()))?;
                match committed
                    .find_partition(&self.config.topic, self.config.partition)
                    .map(|elem| elem.offset())
                {
                    Some(Offset::Offset(offset)) => offset,
                    // No commit recorded for this group yet.
                    _ => earliest,
                }
            }
        };

        debug!(
            partition = self.config.partition,
            policy = %self.config.initial_offset_policy,
            offset,
            "Computed initial offset"
        );
        Ok(offset)
    }

    async fn fetch(&mut self, offset: i64) -> Result<FetchBatch, LogClientError> {
        self.position_at(offset)?;

        let max_records = self.config.fetch_max_records;
        let poll_timeout = self.config.poll_timeout;
        let consumer = self.consumer()?;
        let mut stream = consumer.stream();
        let mut records: Vec<LogRecord> = Vec::new();

        loop {
            let next = tokio::time::timeout(poll_timeout, stream.next()).await;
            match next {
                // Poll window exhausted: deliver what we have.
                Err(_) => break,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    if records.is_empty() {
                        if let Some(code) = Self::fetch_error_code(&e) {
                            return Ok(FetchBatch::from_error(code));
                        }
                        return Err(Self::classify(e));
                    }
                    // Keep the records already read; the error will surface
                    // again on the next fetch if it persists.
                    warn!(error = %e, "Fetch error after partial read");
                    break;
                }
                Ok(Some(Ok(msg))) => {
                    records.push(LogRecord {
                        offset: msg.offset(),
                        key: msg.key().map(<[u8]>::to_vec),
                        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    });
                    if records.len() >= max_records {
                        break;
                    }
                }
            }
        }

        Ok(FetchBatch::from_records(records))
    }

    async fn handle_fetch_error(
        &mut self,
        code: FetchErrorCode,
        offset: i64,
    ) -> Result<Option<i64>, LogClientError> {
        match code {
            FetchErrorCode::OffsetOutOfRange => {
                let (earliest, latest) = self.watermarks()?;
                let rebased = match self.config.initial_offset_policy {
                    InitialOffsetPolicy::Latest => latest,
                    _ => earliest,
                };
                warn!(
                    partition = self.config.partition,
                    offset,
                    rebased,
                    "Offset out of range; rebasing"
                );
                Ok(Some(rebased))
            }
            FetchErrorCode::UnknownTopicOrPartition => Err(LogClientError::fatal(format!(
                "topic {} partition {} does not exist",
                self.config.topic, self.config.partition
            ))),
        }
    }

    async fn latest_offset(&mut self) -> Result<i64, LogClientError> {
        let (_, latest) = self.watermarks()?;
        Ok(latest)
    }

    async fn commit_offset(&mut self, offset: i64) -> Result<(), LogClientError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.config.topic, self.config.partition, Offset::Offset(offset))
            .map_err(|e| LogClientError::recoverable(e.to_string()))?;
        self.consumer()?
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| {
                LogClientError::recoverable(format!("commit of offset {} failed: {}", offset, e))
            })
    }

    async fn reconnect(&mut self) -> Result<(), LogClientError> {
        info!(
            topic = %self.config.topic,
            partition = self.config.partition,
            "Re-establishing Kafka session"
        );
        // Drop the old session first so a half-dead consumer does not
        // linger while the replacement connects.
        self.consumer = None;
        self.consumer = Some(Self::build_consumer(&self.config)?);
        Ok(())
    }

    fn close(&mut self) {
        if self.consumer.take().is_some() {
            info!(
                topic = %self.config.topic,
                partition = self.config.partition,
                "Closed Kafka log client"
            );
        }
    }
}
