//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{CourtConfig, RegistryHandle, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub court: Arc<CourtConfig>,
    pub registry: RegistryHandle,
}

impl AppState {
    /// Spawns the session registry, so this must run inside a tokio runtime
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let court = Arc::new(CourtConfig::default());
        let registry = SessionRegistry::spawn(Arc::clone(&court));

        Self {
            config,
            court,
            registry,
        }
    }
}
