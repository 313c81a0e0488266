//! Integration tests for the per-partition indexing worker.
//!
//! These tests drive the real worker and bulk handler against scripted
//! mock implementations of the log client and the sink provider, covering
//! the round pipeline, the recovery policy, and the shutdown protocol.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};

use stream_indexer::client::{
    FetchBatch, FetchErrorCode, LogClient, LogClientError, LogRecord,
};
use stream_indexer::config::{InitialOffsetPolicy, WorkerConfig};
use stream_indexer::handler::{BulkSinkHandler, RawJsonTransformer};
use stream_indexer::status::LifecycleState;
use stream_indexer::worker::IndexerWorker;
use stream_indexer_sink::{BulkItemResult, BulkSinkProvider, BulkSummary, SinkDocument, SinkError};

/// What one scripted fetch returns.
enum FetchScript {
    /// `count` JSON records starting at the requested offset.
    Records(usize),
    /// An empty batch.
    Empty,
    /// A broker error code carried in the batch.
    ErrorCode(FetchErrorCode),
    /// A classified recoverable client error.
    Recoverable(&'static str),
    /// A classified fatal client error.
    Fatal(&'static str),
}

/// Observable side of the scripted log client, shared with the test.
#[derive(Default)]
struct ClientState {
    fetch_offsets: Mutex<Vec<i64>>,
    commits: Mutex<Vec<i64>>,
    reconnects: AtomicUsize,
    closed: AtomicBool,
}

impl ClientState {
    fn fetch_offsets(&self) -> Vec<i64> {
        self.fetch_offsets.lock().unwrap().clone()
    }

    fn commits(&self) -> Vec<i64> {
        self.commits.lock().unwrap().clone()
    }
}

/// Scripted log client: plays back a fetch script, records every
/// interaction into the shared [`ClientState`].
struct ScriptedLogClient {
    initial_offset: i64,
    script: Mutex<VecDeque<FetchScript>>,
    /// Reported latest offset; `None` mirrors the requested fetch offset
    /// (no drift).
    latest: Option<i64>,
    /// Offset `handle_fetch_error` rebases to, when set.
    rebase_to: Option<i64>,
    /// When true, every reconnect attempt fails.
    reconnect_fails: bool,
    state: Arc<ClientState>,
}

impl ScriptedLogClient {
    fn new(initial_offset: i64, script: Vec<FetchScript>) -> (Self, Arc<ClientState>) {
        let state = Arc::new(ClientState::default());
        (
            Self {
                initial_offset,
                script: Mutex::new(script.into()),
                latest: None,
                rebase_to: None,
                reconnect_fails: false,
                state: Arc::clone(&state),
            },
            state,
        )
    }

    fn json_records(offset: i64, count: usize) -> Vec<LogRecord> {
        (0..count as i64)
            .map(|i| LogRecord {
                offset: offset + i,
                key: Some(format!("key-{}", offset + i).into_bytes()),
                payload: format!(r#"{{"value": {}}}"#, offset + i).into_bytes(),
            })
            .collect()
    }
}

#[async_trait]
impl LogClient for ScriptedLogClient {
    async fn compute_initial_offset(&mut self) -> Result<i64, LogClientError> {
        Ok(self.initial_offset)
    }

    async fn fetch(&mut self, offset: i64) -> Result<FetchBatch, LogClientError> {
        self.state.fetch_offsets.lock().unwrap().push(offset);
        match self.script.lock().unwrap().pop_front() {
            Some(FetchScript::Records(count)) => {
                Ok(FetchBatch::from_records(Self::json_records(offset, count)))
            }
            Some(FetchScript::Empty) | None => Ok(FetchBatch::from_records(Vec::new())),
            Some(FetchScript::ErrorCode(code)) => Ok(FetchBatch::from_error(code)),
            Some(FetchScript::Recoverable(msg)) => Err(LogClientError::recoverable(msg)),
            Some(FetchScript::Fatal(msg)) => Err(LogClientError::fatal(msg)),
        }
    }

    async fn handle_fetch_error(
        &mut self,
        code: FetchErrorCode,
        _offset: i64,
    ) -> Result<Option<i64>, LogClientError> {
        match self.rebase_to {
            Some(rebased) => Ok(Some(rebased)),
            None => Err(LogClientError::recoverable(format!(
                "unhandled fetch error {:?}",
                code
            ))),
        }
    }

    async fn latest_offset(&mut self) -> Result<i64, LogClientError> {
        match self.latest {
            Some(latest) => Ok(latest),
            None => {
                let last_fetch = self
                    .state
                    .fetch_offsets
                    .lock()
                    .unwrap()
                    .last()
                    .copied()
                    .unwrap_or(self.initial_offset);
                Ok(last_fetch)
            }
        }
    }

    async fn commit_offset(&mut self, offset: i64) -> Result<(), LogClientError> {
        self.state.commits.lock().unwrap().push(offset);
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), LogClientError> {
        self.state.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_fails {
            Err(LogClientError::recoverable("broker still unreachable"))
        } else {
            Ok(())
        }
    }

    fn close(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// What one scripted bulk submission does.
enum SinkScript {
    Unreachable(&'static str),
    RejectAll(&'static str),
}

/// Scripted sink provider: plays back failures, then accepts everything.
#[derive(Default)]
struct ScriptedSink {
    script: Mutex<VecDeque<SinkScript>>,
    submissions: Mutex<Vec<usize>>,
}

impl ScriptedSink {
    fn new(script: Vec<SinkScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn submissions(&self) -> Vec<usize> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BulkSinkProvider for ScriptedSink {
    async fn check_ready(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn ensure_index_exists(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn bulk_submit(&self, documents: &[SinkDocument]) -> Result<BulkSummary, SinkError> {
        self.submissions.lock().unwrap().push(documents.len());
        match self.script.lock().unwrap().pop_front() {
            Some(SinkScript::Unreachable(msg)) => Err(SinkError::unreachable(msg)),
            Some(SinkScript::RejectAll(msg)) => Ok(BulkSummary {
                total: documents.len(),
                succeeded: 0,
                failed: documents.len(),
                results: documents
                    .iter()
                    .map(|doc| BulkItemResult {
                        id: doc.id.clone(),
                        success: false,
                        error: Some(msg.to_string()),
                    })
                    .collect(),
            }),
            None => Ok(BulkSummary::all_succeeded(
                documents.iter().map(|doc| doc.id.clone()).collect(),
            )),
        }
    }
}

fn worker_config(sleep_ms: u64) -> WorkerConfig {
    WorkerConfig {
        topic: "events".to_string(),
        partition: 0,
        consumer_group: "test-indexer".to_string(),
        sleep_between_fetches_ms: sleep_ms,
        dry_run: false,
        perf_reporting: false,
        initial_offset_policy: InitialOffsetPolicy::LastCommitted,
    }
}

fn build_worker(
    config: WorkerConfig,
    client: ScriptedLogClient,
    sink: Arc<ScriptedSink>,
) -> IndexerWorker {
    let handler = BulkSinkHandler::new(
        Box::new(RawJsonTransformer::new()),
        sink,
        config.partition,
    );
    IndexerWorker::new(config, Box::new(handler), Box::new(client)).unwrap()
}

/// Poll until `condition` holds, panicking after three seconds.
async fn wait_for(condition: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_happy_path_commits_past_the_batch() {
    let (client, state) = ScriptedLogClient::new(100, vec![FetchScript::Records(10)]);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink.clone());

    let shutdown = worker.shutdown_handle();
    let status = worker.status_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.commits() == vec![110], "commit of offset 110").await;
    wait_for(
        || status.snapshot().state == LifecycleState::InProgress,
        "InProgress state",
    )
    .await;
    assert_eq!(sink.submissions(), vec![10]);

    shutdown.request_shutdown();
    let final_status = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(final_status.state, LifecycleState::Stopped);
    assert_eq!(final_status.last_committed_offset, 110);
    assert!(state.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_empty_fetch_without_drift_commits_nothing() {
    let (client, state) = ScriptedLogClient::new(200, vec![FetchScript::Empty, FetchScript::Empty]);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink.clone());

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.fetch_offsets().len() >= 2, "two rounds of fetching").await;
    shutdown.request_shutdown();
    let final_status = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert!(state.commits().is_empty());
    assert!(sink.submissions().is_empty());
    assert!(state.fetch_offsets().iter().all(|&o| o == 200));
    assert_eq!(final_status.state, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_empty_fetch_with_drift_rereads_the_same_offset() {
    let (mut client, state) =
        ScriptedLogClient::new(200, vec![FetchScript::Empty, FetchScript::Empty]);
    client.latest = Some(250);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink);

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.fetch_offsets().len() >= 2, "two rounds of fetching").await;
    shutdown.request_shutdown();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    // The drift is logged but never committed; the cursor stays put.
    assert!(state.commits().is_empty());
    assert!(state.fetch_offsets().iter().all(|&o| o == 200));
}

#[tokio::test]
async fn test_offset_out_of_range_rebases_without_committing() {
    let (mut client, state) = ScriptedLogClient::new(
        50,
        vec![FetchScript::ErrorCode(FetchErrorCode::OffsetOutOfRange)],
    );
    client.rebase_to = Some(1000);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink.clone());

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.fetch_offsets().len() >= 2, "fetch after the rebase").await;
    shutdown.request_shutdown();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    let fetches = state.fetch_offsets();
    assert_eq!(fetches[0], 50);
    assert_eq!(fetches[1], 1000);
    assert!(state.commits().is_empty());
    assert!(sink.submissions().is_empty());
}

#[tokio::test]
async fn test_unreachable_sink_retries_the_batch_end_to_end() {
    let (client, state) = ScriptedLogClient::new(
        300,
        vec![FetchScript::Records(5), FetchScript::Records(5)],
    );
    let sink = Arc::new(ScriptedSink::new(vec![SinkScript::Unreachable(
        "connection refused",
    )]));
    let worker = build_worker(worker_config(5), client, sink.clone());

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.commits() == vec![305], "commit after the retry").await;
    shutdown.request_shutdown();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    // First post failed, so the same offset was fetched and posted again.
    let fetches = state.fetch_offsets();
    assert_eq!(fetches[0], 300);
    assert_eq!(fetches[1], 300);
    assert_eq!(sink.submissions(), vec![5, 5]);
    assert_eq!(state.commits(), vec![305]);
    assert_eq!(state.reconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sink_data_error_skips_and_commits() {
    let (client, state) = ScriptedLogClient::new(400, vec![FetchScript::Records(10)]);
    let sink = Arc::new(ScriptedSink::new(vec![SinkScript::RejectAll(
        "mapper_parsing_exception",
    )]));
    let worker = build_worker(worker_config(5), client, sink.clone());

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    // The rejected batch is logged and skipped: its offsets commit as if
    // the post had succeeded, and nothing is resubmitted.
    wait_for(|| state.commits() == vec![410], "commit past the rejected batch").await;
    shutdown.request_shutdown();
    let final_status = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert_eq!(sink.submissions(), vec![10]);
    assert_eq!(final_status.last_committed_offset, 410);
}

#[tokio::test]
async fn test_shutdown_during_sleep_preserves_the_committed_offset() {
    let (client, state) = ScriptedLogClient::new(100, vec![FetchScript::Records(10)]);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(100), client, sink);

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.commits() == vec![110], "commit of offset 110").await;
    shutdown.request_shutdown();

    let final_status = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(final_status.state, LifecycleState::Stopped);
    assert_eq!(final_status.last_committed_offset, 110);
}

#[tokio::test]
async fn test_double_broker_failure_terminates_the_worker() {
    let (mut client, state) =
        ScriptedLogClient::new(0, vec![FetchScript::Recoverable("fetch timed out")]);
    client.reconnect_fails = true;
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink);

    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let final_status = timeout(Duration::from_secs(5), worker.run(cancel_rx))
        .await
        .unwrap();

    assert_eq!(final_status.state, LifecycleState::Failed);
    assert_eq!(state.reconnects.load(Ordering::SeqCst), 1);
    assert!(state.closed.load(Ordering::SeqCst));
    assert!(state.commits().is_empty());
}

#[tokio::test]
async fn test_recoverable_failure_reconnects_once_and_continues() {
    let (client, state) = ScriptedLogClient::new(
        100,
        vec![
            FetchScript::Recoverable("leader election in progress"),
            FetchScript::Records(10),
        ],
    );
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink);

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.commits() == vec![110], "commit after the reconnect").await;
    shutdown.request_shutdown();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert_eq!(state.reconnects.load(Ordering::SeqCst), 1);
    // Both fetches targeted the same offset: nothing advanced until the
    // batch actually went through.
    assert!(state.fetch_offsets().iter().all(|&o| o == 100));
}

#[tokio::test]
async fn test_broker_fatal_error_fails_immediately() {
    let (client, state) =
        ScriptedLogClient::new(0, vec![FetchScript::Fatal("unknown topic or partition")]);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(5), client, sink);

    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let final_status = timeout(Duration::from_secs(5), worker.run(cancel_rx))
        .await
        .unwrap();

    assert_eq!(final_status.state, LifecycleState::Failed);
    assert_eq!(state.reconnects.load(Ordering::SeqCst), 0);
    assert!(state.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dry_run_never_posts_or_commits() {
    let (client, state) = ScriptedLogClient::new(
        100,
        vec![FetchScript::Records(10), FetchScript::Records(10)],
    );
    let sink = Arc::new(ScriptedSink::default());
    let mut config = worker_config(5);
    config.dry_run = true;
    let worker = build_worker(config, client, sink.clone());

    let shutdown = worker.shutdown_handle();
    let (_cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| state.fetch_offsets().len() >= 2, "two dry-run rounds").await;
    shutdown.request_shutdown();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    // Dry runs stage only: no post, no commit, no cursor movement.
    assert!(sink.submissions().is_empty());
    assert!(state.commits().is_empty());
    assert!(state.fetch_offsets().iter().all(|&o| o == 100));
}

#[tokio::test]
async fn test_cancellation_stops_the_worker() {
    let (client, state) = ScriptedLogClient::new(100, vec![FetchScript::Records(10)]);
    let sink = Arc::new(ScriptedSink::default());
    let worker = build_worker(worker_config(50), client, sink);

    let (cancel_tx, cancel_rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(cancel_rx));

    wait_for(|| !state.commits().is_empty(), "first commit").await;
    cancel_tx.send(()).unwrap();

    let final_status = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(final_status.state, LifecycleState::Stopped);
    assert!(state.closed.load(Ordering::SeqCst));
}
