//! Error types for the indexing worker.

use thiserror::Error;

use crate::client::LogClientError;

/// Errors surfacing from a worker round to the outer loop.
///
/// Only broker failures escalate this far: they are classified at the log
/// client and lifted here unchanged, so the loop's dispositions are
/// exhaustive rather than a catch-all. Sink failures never reach the loop;
/// the post step resolves them in place (retry without commit when the
/// sink is unreachable, log-and-commit-past when it rejects records), and
/// cancellation is signalled out-of-band through the shutdown flag and
/// cancellation channel.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Transient broker failure; worth one reconnect attempt.
    #[error("Recoverable broker error: {0}")]
    BrokerRecoverable(String),

    /// Broker failure that reconnection cannot fix.
    #[error("Fatal broker error: {0}")]
    BrokerFatal(String),
}

impl WorkerError {
    /// Create a recoverable broker error.
    pub fn broker_recoverable(msg: impl Into<String>) -> Self {
        Self::BrokerRecoverable(msg.into())
    }

    /// Create a fatal broker error.
    pub fn broker_fatal(msg: impl Into<String>) -> Self {
        Self::BrokerFatal(msg.into())
    }
}

impl From<LogClientError> for WorkerError {
    fn from(err: LogClientError) -> Self {
        match err {
            LogClientError::Recoverable(msg) => Self::BrokerRecoverable(msg),
            LogClientError::Fatal(msg) => Self::BrokerFatal(msg),
        }
    }
}

/// Errors from process bootstrap: configuration, dependency wiring, index
/// preparation.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A dependency could not be initialized.
    #[error("Bootstrap error: {0}")]
    BootstrapError(String),

    /// One or more workers terminated in the `Failed` state.
    #[error("{0} worker(s) terminated in the Failed state")]
    WorkersFailed(usize),
}

impl IndexerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a bootstrap error.
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::BootstrapError(msg.into())
    }
}
