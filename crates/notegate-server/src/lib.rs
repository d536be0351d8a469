// Main library module for Notegate - the request-admission and consistency
// layer that fronts a note-taking API

// Module declarations
pub mod api; // HTTP handlers wrapped by the admission pipeline
pub mod identity; // Bearer-token identity extraction (auth collaborator)
pub mod metrics; // Metrics and observability
pub mod middleware; // Admission pipeline middleware
pub mod model; // Configuration, app state, response envelopes, note model
pub mod record; // Record store collaborator interface
pub mod startup; // Logging, HTTP server and shutdown wiring

// Re-export common types for downstream convenience
pub use notegate_common::{ErrorCode, GateError};

pub use model::app_state::AppState;
pub use model::config::Configuration;
