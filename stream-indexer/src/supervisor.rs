//! Supervision of the per-partition workers.
//!
//! Spawns one task per worker, turns Ctrl-C into a graceful shutdown
//! request on every worker, and collects the terminal statuses.

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::status::{JobStatus, LifecycleState};
use crate::worker::IndexerWorker;

/// Runs a set of indexing workers to completion.
pub struct Supervisor {
    shutdown_tx: broadcast::Sender<()>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Trigger a graceful shutdown of all running workers.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run all workers until they reach a terminal state.
    ///
    /// Blocks until every worker has exited, either on its own (terminal
    /// failure) or after Ctrl-C propagated a shutdown request. Returns the
    /// terminal status of each worker.
    pub async fn run(&self, workers: Vec<IndexerWorker>) -> Vec<JobStatus> {
        let mut shutdown_handles = Vec::with_capacity(workers.len());
        let mut status_handles = Vec::with_capacity(workers.len());
        let mut tasks = Vec::with_capacity(workers.len());

        for worker in workers {
            info!(partition = worker.partition(), "Spawning indexing worker");
            shutdown_handles.push(worker.shutdown_handle());
            status_handles.push(worker.status_handle());
            let cancel = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(worker.run(cancel)));
        }

        let all_workers = join_all(tasks);
        tokio::pin!(all_workers);

        let results = tokio::select! {
            results = &mut all_workers => results,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal; stopping all workers");
                for handle in &shutdown_handles {
                    handle.request_shutdown();
                }
                let _ = self.shutdown_tx.send(());
                all_workers.await
            }
        };

        let mut statuses = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            let status = match result {
                Ok(status) => status,
                Err(join_err) => {
                    // A panicked worker never published a terminal state;
                    // mark it failed so the exit code reflects it.
                    error!(error = %join_err, "Worker task ended abnormally");
                    status_handles[index].set_state(LifecycleState::Failed);
                    status_handles[index].snapshot()
                }
            };
            info!(%status, "Worker terminated");
            statuses.push(status);
        }
        statuses
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether any worker terminated in the `Failed` state.
pub fn any_failed(statuses: &[JobStatus]) -> bool {
    statuses
        .iter()
        .any(|s| s.state == LifecycleState::Failed)
}
