//! Worker lifecycle status, observable by supervisors.
//!
//! Each worker publishes its coarse execution phase and last committed
//! offset through a shared handle. Supervisors read snapshots concurrently
//! with worker writes; a single lock guards the record so readers always
//! see a consistent pair.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Coarse execution phase of an indexing worker.
///
/// `Stopped` and `Failed` are terminal: once entered, no further transition
/// is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not yet wired.
    Created,
    /// Construction complete, ready to run.
    Initialized,
    /// `run()` has been entered.
    Started,
    /// At least one round has executed.
    InProgress,
    /// Shut down cooperatively.
    Stopped,
    /// Terminated on an unrecoverable error.
    Failed,
}

impl LifecycleState {
    /// Whether this state accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Initialized => "Initialized",
            Self::Started => "Started",
            Self::InProgress => "InProgress",
            Self::Stopped => "Stopped",
            Self::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of a worker's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    /// Offset most recently recorded as the worker's progress marker.
    pub last_committed_offset: i64,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Partition this worker owns.
    pub partition: i32,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition={} state={} last_committed_offset={}",
            self.partition, self.state, self.last_committed_offset
        )
    }
}

/// Shared, thread-safe view of a worker's status.
///
/// The worker is the single writer; any number of supervisor threads may
/// call [`snapshot`](Self::snapshot) concurrently.
#[derive(Debug, Clone)]
pub struct JobStatusHandle {
    inner: Arc<RwLock<JobStatus>>,
}

impl JobStatusHandle {
    /// Create a handle for a partition, starting in `Created`.
    pub fn new(partition: i32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(JobStatus {
                last_committed_offset: -1,
                state: LifecycleState::Created,
                partition,
            })),
        }
    }

    /// Current status snapshot.
    pub fn snapshot(&self) -> JobStatus {
        *self.inner.read().expect("status lock poisoned")
    }

    /// Transition to a new lifecycle state.
    ///
    /// Transitions out of a terminal state are ignored, so a late writer
    /// cannot resurrect a stopped or failed worker.
    pub fn set_state(&self, state: LifecycleState) {
        let mut status = self.inner.write().expect("status lock poisoned");
        if status.state.is_terminal() {
            return;
        }
        status.state = state;
    }

    /// Record the offset the worker is currently working from.
    pub fn set_last_committed_offset(&self, offset: i64) {
        let mut status = self.inner.write().expect("status lock poisoned");
        status.last_committed_offset = offset;
    }
}

/// Supervisor-facing shutdown request flag.
///
/// Write-once false → true; requesting shutdown more than once is a no-op.
/// The worker polls the flag at round boundaries.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request a graceful shutdown. Non-blocking, idempotent.
    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}
