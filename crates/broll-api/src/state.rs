//! Application state.

use std::sync::Arc;

use broll_media::UrlProbe;
use broll_queue::{TaskQueue, TaskStore};
use broll_storage::ArtifactStore;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<TaskQueue>,
    pub probe: Arc<dyn UrlProbe>,
    pub artifacts: ArtifactStore,
    /// Cumulative size ceiling enforced at intake, in bytes
    pub max_total_bytes: u64,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn TaskStore>,
        queue: Arc<TaskQueue>,
        probe: Arc<dyn UrlProbe>,
        artifacts: ArtifactStore,
        max_total_bytes: u64,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            probe,
            artifacts,
            max_total_bytes,
        }
    }
}
