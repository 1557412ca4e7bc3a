use vidtune_core::{BatchOrchestrator, Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: BatchOrchestrator,
}

impl AppState {
    pub fn new(config: Config, orchestrator: BatchOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }
}
