//! The per-partition indexing worker.
//!
//! A worker owns one partition end to end: it fetches record batches from
//! the log client, stages them through the message handler, posts the
//! staged bulk to the sink, and commits the advanced offset back to the
//! log. One round = one pass through that pipeline. The loop classifies
//! every failure into a fixed disposition: recoverable broker errors earn
//! one reconnect attempt, fatal broker errors terminate, an unreachable
//! sink retries the same offset without committing, and data-level sink
//! rejections are logged and skipped past.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::client::{FetchBatch, LogClient};
use crate::config::WorkerConfig;
use crate::errors::{IndexerError, WorkerError};
use crate::failed_events;
use crate::handler::{HandlerError, MessageHandler};
use crate::status::{JobStatus, JobStatusHandle, LifecycleState, ShutdownHandle};

/// Long-lived indexing task for a single partition.
///
/// Constructed with explicit collaborators and owned exclusively: the
/// worker is the only user of its log client and handler. Supervisors
/// interact through the cloneable [`ShutdownHandle`] and
/// [`JobStatusHandle`] obtained before `run` consumes the worker.
pub struct IndexerWorker {
    config: WorkerConfig,
    handler: Box<dyn MessageHandler>,
    log_client: Box<dyn LogClient>,
    /// Offset at which the current round's fetch was issued.
    offset_for_this_round: i64,
    /// Offset of the next record not yet acknowledged. Invariant:
    /// `offset_for_this_round <= next_offset_to_process`.
    next_offset_to_process: i64,
    /// True until the first successful offset determination.
    starting_first_time: bool,
    shutdown: ShutdownHandle,
    status: JobStatusHandle,
}

impl IndexerWorker {
    /// Create a worker in the `Initialized` state.
    ///
    /// Fails only if the configuration is invalid.
    pub fn new(
        config: WorkerConfig,
        handler: Box<dyn MessageHandler>,
        log_client: Box<dyn LogClient>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;

        let status = JobStatusHandle::new(config.partition);
        let worker = Self {
            config,
            handler,
            log_client,
            offset_for_this_round: 0,
            next_offset_to_process: 0,
            starting_first_time: true,
            shutdown: ShutdownHandle::new(),
            status,
        };
        worker.status.set_state(LifecycleState::Initialized);

        info!(
            topic = %worker.config.topic,
            partition = worker.config.partition,
            dry_run = worker.config.dry_run,
            "Created indexing worker"
        );
        Ok(worker)
    }

    /// Partition this worker owns.
    pub fn partition(&self) -> i32 {
        self.config.partition
    }

    /// Handle for requesting a graceful shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Handle for observing lifecycle state and offset progress.
    pub fn status_handle(&self) -> JobStatusHandle {
        self.status.clone()
    }

    /// Current status snapshot.
    pub fn status(&self) -> JobStatus {
        self.status.snapshot()
    }

    /// Drive the fetch → stage → post → commit loop until a terminal state.
    ///
    /// Returns the final status once the worker has stopped or failed.
    /// Cancellation is polled at round boundaries only: a round in flight
    /// finishes its current step, bounded by the clients' own deadlines.
    /// The `cancel` channel closing counts as cancellation (the execution
    /// context is gone).
    pub async fn run(mut self, mut cancel: broadcast::Receiver<()>) -> JobStatus {
        self.status.set_state(LifecycleState::Started);
        info!(
            topic = %self.config.topic,
            partition = self.config.partition,
            "Starting indexing worker"
        );

        loop {
            if self.shutdown.is_requested() {
                info!(
                    partition = self.config.partition,
                    "Shutdown requested; stopping worker"
                );
                self.status.set_state(LifecycleState::Stopped);
                break;
            }
            if cancellation_fired(&mut cancel) {
                info!(
                    partition = self.config.partition,
                    "Execution context cancelled; stopping worker"
                );
                self.status.set_state(LifecycleState::Stopped);
                break;
            }

            debug!(
                partition = self.config.partition,
                "Starting a new round of indexing"
            );
            match self.process_round().await {
                Ok(()) => {
                    self.status.set_state(LifecycleState::InProgress);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(
                            self.config.sleep_between_fetches_ms,
                        )) => {}
                        _ = cancel.recv() => {
                            info!(
                                partition = self.config.partition,
                                "Execution context cancelled during sleep; stopping worker"
                            );
                            self.status.set_state(LifecycleState::Stopped);
                            break;
                        }
                    }
                }
                Err(WorkerError::BrokerFatal(msg)) => {
                    error!(
                        partition = self.config.partition,
                        error = %msg,
                        "Fatal broker error; stopping worker"
                    );
                    self.status.set_state(LifecycleState::Failed);
                    break;
                }
                Err(WorkerError::BrokerRecoverable(msg)) => {
                    error!(
                        partition = self.config.partition,
                        error = %msg,
                        "Recoverable broker error; attempting to re-establish the session"
                    );
                    match self.log_client.reconnect().await {
                        Ok(()) => {
                            info!(
                                partition = self.config.partition,
                                "Broker session re-established"
                            );
                        }
                        Err(reconnect_err) => {
                            // Still failing after one reconnect: stop and
                            // leave the restart decision to external
                            // supervision instead of retrying forever.
                            error!(
                                partition = self.config.partition,
                                error = %reconnect_err,
                                "Reconnect failed; stopping worker"
                            );
                            self.status.set_state(LifecycleState::Failed);
                            break;
                        }
                    }
                }
            }
        }

        self.log_client.close();
        let status = self.status.snapshot();
        warn!(%status, "Indexing worker exited");
        status
    }

    /// One round: determine offset, fetch, stage, post, commit.
    async fn process_round(&mut self) -> Result<(), WorkerError> {
        let round_start = Instant::now();

        self.determine_offset_for_this_round().await?;

        let Some(batch) = self.fetch_records(round_start).await? else {
            return Ok(());
        };

        let stage_start = Instant::now();
        let proposed_next_offset = self.handler.prepare_for_post(&batch.records);
        if self.config.perf_reporting {
            debug!(
                partition = self.config.partition,
                elapsed_ms = stage_start.elapsed().as_millis() as u64,
                "Completed staging for post"
            );
        }

        if self.config.dry_run {
            info!(
                partition = self.config.partition,
                first_offset = self.offset_for_this_round,
                last_offset = proposed_next_offset - 1,
                "Dry run: not posting to the sink and not committing the offset"
            );
            return Ok(());
        }

        if !self.post_batch(proposed_next_offset).await {
            return Ok(());
        }
        self.commit_offset(round_start).await
    }

    /// Step (a): pick the offset this round fetches from.
    async fn determine_offset_for_this_round(&mut self) -> Result<(), WorkerError> {
        if self.starting_first_time {
            self.status.set_state(LifecycleState::InProgress);
            let initial = self.log_client.compute_initial_offset().await?;
            self.offset_for_this_round = initial;
            self.next_offset_to_process = initial;
            // The cursor is authoritative from here on; the stored offset
            // is only consulted again after a restart.
            self.starting_first_time = false;
            info!(
                partition = self.config.partition,
                offset = initial,
                policy = %self.config.initial_offset_policy,
                "Determined initial offset"
            );
        } else {
            self.offset_for_this_round = self.next_offset_to_process;
        }
        self.status
            .set_last_committed_offset(self.offset_for_this_round);
        Ok(())
    }

    /// Step (b): fetch a batch. `None` ends the round early: a broker error
    /// code that rebased (or will be retried), or an empty batch.
    async fn fetch_records(
        &mut self,
        round_start: Instant,
    ) -> Result<Option<FetchBatch>, WorkerError> {
        let batch = self.log_client.fetch(self.offset_for_this_round).await?;

        if self.config.perf_reporting {
            debug!(
                partition = self.config.partition,
                elapsed_ms = round_start.elapsed().as_millis() as u64,
                records = batch.records.len(),
                "Completed fetch from the log"
            );
        }

        if let Some(code) = batch.error {
            let rebased = self
                .log_client
                .handle_fetch_error(code, self.offset_for_this_round)
                .await?;
            if let Some(rebased) = rebased {
                warn!(
                    partition = self.config.partition,
                    offset = self.offset_for_this_round,
                    rebased,
                    "Fetch error rebased the next offset"
                );
                self.next_offset_to_process = rebased;
            }
            return Ok(None);
        }

        if batch.valid_bytes == 0 {
            let latest = self.log_client.latest_offset().await?;
            if latest != self.offset_for_this_round {
                // The log claims more records than we can read from this
                // offset. Do not commit anything here; re-read the same
                // offset next round.
                warn!(
                    partition = self.config.partition,
                    offset = self.offset_for_this_round,
                    latest,
                    "No records read but the latest offset differs; will re-read the same offset"
                );
            } else {
                debug!(
                    partition = self.config.partition,
                    offset = self.offset_for_this_round,
                    "No new records; finishing this round"
                );
            }
            return Ok(None);
        }

        Ok(Some(batch))
    }

    /// Step (d): post the staged batch. Returns false when the batch must
    /// be re-processed from the same offset (sink unreachable). Data-level
    /// rejections are logged and then treated as posted, so their offsets
    /// commit and the records are skipped rather than retried.
    async fn post_batch(&mut self, proposed_next_offset: i64) -> bool {
        info!(
            partition = self.config.partition,
            first_offset = self.offset_for_this_round,
            last_offset = proposed_next_offset - 1,
            "Posting batch to the sink"
        );

        match self.handler.post_to_sink().await {
            Ok(()) => {}
            Err(HandlerError::SinkUnreachable(msg)) => {
                warn!(
                    partition = self.config.partition,
                    first_offset = self.offset_for_this_round,
                    last_offset = proposed_next_offset - 1,
                    error = %msg,
                    "Sink unreachable; will re-process the batch from the same offset"
                );
                return false;
            }
            Err(HandlerError::SinkData(msg)) => {
                error!(
                    partition = self.config.partition,
                    first_offset = self.offset_for_this_round,
                    last_offset = proposed_next_offset - 1,
                    error = %msg,
                    "Sink rejected records; skipping them"
                );
                failed_events::batch_dropped(
                    self.config.partition,
                    self.offset_for_this_round,
                    proposed_next_offset - 1,
                    &msg,
                );
            }
        }

        self.next_offset_to_process = proposed_next_offset;
        true
    }

    /// Step (e): persist the advanced offset at the log broker.
    async fn commit_offset(&mut self, round_start: Instant) -> Result<(), WorkerError> {
        info!(
            partition = self.config.partition,
            offset = self.next_offset_to_process,
            "Committing offset"
        );
        self.log_client
            .commit_offset(self.next_offset_to_process)
            .await?;
        self.status
            .set_last_committed_offset(self.next_offset_to_process);

        if self.config.perf_reporting {
            info!(
                partition = self.config.partition,
                elapsed_ms = round_start.elapsed().as_millis() as u64,
                "Round complete"
            );
        }
        info!(
            partition = self.config.partition,
            first_offset = self.offset_for_this_round,
            next_offset = self.next_offset_to_process,
            "Finished round of indexing"
        );
        Ok(())
    }
}

/// Non-blocking poll of the cancellation channel.
fn cancellation_fired(cancel: &mut broadcast::Receiver<()>) -> bool {
    use broadcast::error::TryRecvError;
    match cancel.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty) => false,
    }
}
