//! Application state.

use std::sync::Arc;

use vidshift_worker::JobService;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub service: Arc<JobService>,
}

impl AppState {
    pub fn new(config: ApiConfig, service: JobService) -> Self {
        Self {
            config,
            service: Arc::new(service),
        }
    }
}
