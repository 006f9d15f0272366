//! Shared server state: read-only config, probe client and the shutdown signal.

use crate::config::Config;
use crate::multiplexer::Cadence;
use crate::probe::ServiceProbe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    // Loaded once at startup, never mutated
    pub config: Arc<Config>,
    pub probe: ServiceProbe,
    pub cadence: Cadence,

    // Flips to true when the server is shutting down
    pub shutdown: watch::Receiver<bool>,

    // Dashboard page served at `/`
    pub template: PathBuf,
}
