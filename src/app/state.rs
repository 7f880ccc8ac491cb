//! Application state shared across routes

use std::sync::Arc;

use crate::arena::ArenaService;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub arena: ArenaService,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let arena = ArenaService::new(config.arena_settings());

        Self {
            config: Arc::new(config),
            arena,
        }
    }
}
