//! Stream Indexer Main Entry Point
//!
//! Spawns one indexing worker per configured partition, consuming from
//! Kafka and bulk-indexing into OpenSearch.

use dotenv::dotenv;
use std::env;
use stream_indexer::{supervisor, Dependencies, IndexerError, Supervisor};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stream_indexer=info,stream_indexer_sink=info"));

    let json_output = env::var("LOG_JSON")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();
    }

    info!(
        service_name = "stream-indexer",
        service_version = env!("CARGO_PKG_VERSION"),
        json = json_output,
        "Tracing initialized"
    );
}

#[tokio::main]
async fn main() -> Result<(), IndexerError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing();

    info!("Starting stream indexer");

    let deps = match Dependencies::new().await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let supervisor = Supervisor::new();
    let statuses = supervisor.run(deps.workers).await;

    if supervisor::any_failed(&statuses) {
        let failed = statuses
            .iter()
            .filter(|s| s.state == stream_indexer::LifecycleState::Failed)
            .count();
        error!(failed, "Stream indexer finished with failed workers");
        return Err(IndexerError::WorkersFailed(failed));
    }

    info!("Stream indexer finished");
    Ok(())
}
