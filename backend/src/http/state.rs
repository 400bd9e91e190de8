//! Application state for the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::generator::ProcessGenerator;
use crate::services::{GenerationPipeline, JobTracker, PipelineSettings};
use crate::snapshot::{FileSnapshotStore, SnapshotStore};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Generation request pipeline
    pub pipeline: GenerationPipeline,
    /// Store holding the latest generated workbook
    pub snapshot: Arc<dyn SnapshotStore>,
    /// Maximum accepted request body size in bytes
    pub body_limit: usize,
}

impl AppState {
    /// Create a new application state from its parts.
    pub fn new(
        pipeline: GenerationPipeline,
        snapshot: Arc<dyn SnapshotStore>,
        body_limit: usize,
    ) -> Self {
        Self {
            pipeline,
            snapshot,
            body_limit,
        }
    }

    /// Wire the subprocess generator and file snapshot store from configuration.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let snapshot: Arc<dyn SnapshotStore> =
            Arc::new(FileSnapshotStore::new(config.storage.snapshot_path.clone()));
        let pipeline = GenerationPipeline::new(
            Arc::new(ProcessGenerator::from_settings(&config.generator)),
            snapshot.clone(),
            JobTracker::new(config.storage.job_history),
            PipelineSettings::from_config(config),
        );
        Self::new(pipeline, snapshot, config.server.body_limit_mb * 1024 * 1024)
    }

    /// Directory for staged uploads.
    pub fn uploads_dir(&self) -> PathBuf {
        self.pipeline.settings().uploads_dir.clone()
    }
}
