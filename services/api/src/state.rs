//! Shared Application State

use crate::{config::Config, ws::BridgeSupervisor};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supervisor: Arc<BridgeSupervisor>,
}
