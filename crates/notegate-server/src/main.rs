//! Main entry point for the Notegate server.
//!
//! Wires the shared state store, the admission services and the HTTP
//! server together. The in-memory store is the single-process substrate;
//! a distributed deployment plugs a remote implementation behind the same
//! `StateStore` handle.

use std::sync::Arc;
use std::time::Duration;

use notegate_server::{
    metrics,
    model::{app_state::AppState, config::Configuration},
    record::{MemoryRecordStore, RecordStore},
    startup::{self, GracefulShutdown},
};
use notegate_store::{MemoryStateStore, StateStore};
use tracing::{error, info};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize configuration and logging
    let configuration = Configuration::new();
    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)?;

    // Initialize metrics for observability
    metrics::init_metrics();

    let address = configuration.server_address();
    let port = configuration.server_port();

    // The shared substrate and the record-store collaborator, constructed
    // once and torn down at exit
    let state_store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());

    let app_state = Arc::new(AppState::new(configuration, state_store, records));

    // Initialize graceful shutdown handler
    let shutdown_signal = startup::wait_for_shutdown_signal().await;
    let graceful_shutdown = GracefulShutdown::new(shutdown_signal, Duration::from_secs(30));

    info!("Starting Notegate server on {}:{}", address, port);
    let server = startup::http_server(app_state.clone(), address, port)?;

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = graceful_shutdown.wait_for_shutdown() => {
            info!("Server shutting down gracefully");
        }
    }

    // Stop broadcaster relays so pending subscriptions close promptly
    app_state.broadcaster.shutdown().await;

    info!("Notegate server shutdown complete");
    Ok(())
}
