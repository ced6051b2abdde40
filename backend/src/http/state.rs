//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::repository::FullRepository;
use crate::ingest::NormalizeOptions;
use crate::services::job_tracker::JobTracker;
use crate::services::EngineOptions;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for database operations
    pub repository: Arc<dyn FullRepository>,
    /// Import jobs running in the background
    pub job_tracker: JobTracker,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(repository: Arc<dyn FullRepository>, config: AppConfig) -> Self {
        Self {
            repository,
            job_tracker: JobTracker::new(),
            config: Arc::new(config),
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            header_search_rows: self.config.pipeline.header_search_rows,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::from(&self.config.pipeline)
    }
}
