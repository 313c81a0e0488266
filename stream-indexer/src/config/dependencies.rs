//! Dependency initialization and wiring for the indexer.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::client::{KafkaClientConfig, KafkaLogClient};
use crate::config::{InitialOffsetPolicy, WorkerConfig};
use crate::errors::IndexerError;
use crate::handler::{BulkSinkHandler, RawJsonTransformer};
use crate::worker::IndexerWorker;
use stream_indexer_sink::opensearch::IndexConfig;
use stream_indexer_sink::{BulkSinkProvider, OpenSearchSink};

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

/// Default topic to index.
const DEFAULT_TOPIC: &str = "events";

/// Default consumer group identity.
const DEFAULT_CONSUMER_GROUP: &str = "stream-indexer";

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default delay between successful rounds, in milliseconds.
const DEFAULT_SLEEP_BETWEEN_FETCHES_MS: u64 = 1000;

/// Default per-fetch record cap.
const DEFAULT_FETCH_MAX_RECORDS: usize = 500;

/// Default poll timeout for one fetch, in milliseconds.
const DEFAULT_FETCH_POLL_TIMEOUT_MS: u64 = 1000;

/// Deadline for broker metadata operations.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Container for all initialized dependencies: one worker per partition,
/// ready to hand to the supervisor.
pub struct Dependencies {
    /// Configured workers, one per partition.
    pub workers: Vec<IndexerWorker>,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKERS`: broker addresses (default: localhost:9092)
    /// - `TOPIC`: topic to index (default: events)
    /// - `PARTITIONS`: comma-separated partition list (default: 0)
    /// - `CONSUMER_GROUP`: committed-offset identity (default: stream-indexer)
    /// - `SLEEP_BETWEEN_FETCHES_MS`: inter-round delay (default: 1000)
    /// - `DRY_RUN`: stage only, never post or commit (default: false)
    /// - `PERF_REPORTING`: per-step timing diagnostics (default: false)
    /// - `INITIAL_OFFSET_POLICY`: earliest | latest | last-committed
    ///   (default: last-committed)
    /// - `FETCH_MAX_RECORDS`: per-fetch record cap (default: 500)
    /// - `FETCH_POLL_TIMEOUT_MS`: fetch poll window (default: 1000)
    /// - `OPENSEARCH_URL`: sink address (default: http://localhost:9200)
    /// - `INDEX_NAME`: target index base name (default: events)
    /// - `INDEX_VERSION`: target index version (default: 0)
    pub async fn new() -> Result<Self, IndexerError> {
        let brokers = env_or("KAFKA_BROKERS", DEFAULT_KAFKA_BROKERS);
        let topic = env_or("TOPIC", DEFAULT_TOPIC);
        let consumer_group = env_or("CONSUMER_GROUP", DEFAULT_CONSUMER_GROUP);
        let partitions = parse_partitions(&env_or("PARTITIONS", "0"))?;
        let sleep_between_fetches_ms =
            env_parsed("SLEEP_BETWEEN_FETCHES_MS", DEFAULT_SLEEP_BETWEEN_FETCHES_MS);
        let dry_run = env_flag("DRY_RUN");
        let perf_reporting = env_flag("PERF_REPORTING");
        let initial_offset_policy: InitialOffsetPolicy = env::var("INITIAL_OFFSET_POLICY")
            .map(|v| v.parse())
            .unwrap_or(Ok(InitialOffsetPolicy::LastCommitted))?;
        let fetch_max_records = env_parsed("FETCH_MAX_RECORDS", DEFAULT_FETCH_MAX_RECORDS);
        let fetch_poll_timeout_ms =
            env_parsed("FETCH_POLL_TIMEOUT_MS", DEFAULT_FETCH_POLL_TIMEOUT_MS);

        let opensearch_url = env_or("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL);
        let index_name = env_or("INDEX_NAME", "events");
        let index_version = env_parsed("INDEX_VERSION", 0u32);

        info!(
            brokers = %brokers,
            topic = %topic,
            partitions = ?partitions,
            consumer_group = %consumer_group,
            opensearch_url = %opensearch_url,
            dry_run,
            initial_offset_policy = %initial_offset_policy,
            "Initializing dependencies"
        );

        let sink = OpenSearchSink::new(
            &opensearch_url,
            IndexConfig::new(index_name, index_version),
        )
        .map_err(|e| IndexerError::bootstrap(format!("Failed to create sink: {}", e)))?;

        sink.check_ready()
            .await
            .map_err(|e| IndexerError::bootstrap(format!("Sink is not ready: {}", e)))?;
        sink.ensure_index_exists()
            .await
            .map_err(|e| IndexerError::bootstrap(format!("Failed to ensure index exists: {}", e)))?;

        let sink: Arc<dyn BulkSinkProvider> = Arc::new(sink);

        let mut workers = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let worker_config = WorkerConfig {
                topic: topic.clone(),
                partition,
                consumer_group: consumer_group.clone(),
                sleep_between_fetches_ms,
                dry_run,
                perf_reporting,
                initial_offset_policy,
            };

            let log_client = KafkaLogClient::new(KafkaClientConfig {
                brokers: brokers.clone(),
                topic: topic.clone(),
                partition,
                group: consumer_group.clone(),
                initial_offset_policy,
                fetch_max_records,
                poll_timeout: Duration::from_millis(fetch_poll_timeout_ms),
                metadata_timeout: METADATA_TIMEOUT,
            })
            .map_err(|e| {
                IndexerError::bootstrap(format!(
                    "Failed to create Kafka client for partition {}: {}",
                    partition, e
                ))
            })?;

            let handler = BulkSinkHandler::new(
                Box::new(RawJsonTransformer::new()),
                Arc::clone(&sink),
                partition,
            );

            workers.push(IndexerWorker::new(
                worker_config,
                Box::new(handler),
                Box::new(log_client),
            )?);
        }

        Ok(Self { workers })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn parse_partitions(raw: &str) -> Result<Vec<i32>, IndexerError> {
    let mut partitions = Vec::new();
    for part in raw.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let partition: i32 = trimmed.parse().map_err(|_| {
            IndexerError::config(format!("Invalid partition '{}' in PARTITIONS", trimmed))
        })?;
        partitions.push(partition);
    }
    if partitions.is_empty() {
        return Err(IndexerError::config("PARTITIONS resolved to an empty list"));
    }
    Ok(partitions)
}
