//! pvsync — collector and ingestion service for the SEMS monitoring portal.
//!
//! Exposes the modules shared by the binary and the integration tests in
//! `tests/`.

pub mod api;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod numeric;
pub mod sems;
pub mod store;

use sems::client::SemsClient;
use store::postgres::PgStore;

/// Shared application state passed to handlers and background jobs.
pub struct AppState {
    pub db: PgStore,
    pub sems: SemsClient,
    pub config: config::Config,
}
