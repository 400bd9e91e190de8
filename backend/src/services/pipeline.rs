//! Generation pipeline.
//!
//! One call to [`GenerationPipeline::generate`] handles one generation
//! request end to end:
//!
//! ```text
//! received -> running -> validating -> streaming -> cleaned_up
//!                  \            \
//!                   +------------+--> failed ----> cleaned_up
//! ```
//!
//! The uploaded dataset and the generator output are owned by a
//! [`RequestScope`]; dropping the scope removes both files and records the
//! `cleaned_up` state, so cleanup happens exactly once on every exit path,
//! panics included. On success the scope is handed to a background task
//! that mirrors the artifact into the snapshot store before it is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use super::checksum::calculate_checksum;
use super::job_tracker::{JobTracker, LogLevel, RequestState};
use super::transient::{sanitize_file_name, TransientFile};
use crate::config::ServiceConfig;
use crate::generator::{GenerationOutcome, Generator, RunnerError};
use crate::snapshot::SnapshotStore;
use crate::workbook::{self, WorkbookError};

/// File name offered to clients for a generated workbook.
pub const ARTIFACT_FILE_NAME: &str = "generated_timetables.xlsx";

/// Captured output of a failed generator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationDiagnostics {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GenerationDiagnostics {
    fn from_outcome(outcome: &GenerationOutcome) -> Self {
        Self {
            exit_code: outcome.exit_code(),
            stdout: outcome.stdout.clone(),
            stderr: outcome.stderr.clone(),
        }
    }
}

/// Errors returned to the caller of a generation request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The upload is missing, empty or not a workbook.
    #[error("{0}")]
    BadRequest(String),

    /// No generator slot became free in time.
    #[error("All {limit} generator slots are busy, try again later")]
    Busy { limit: usize },

    #[error("Failed to start the timetable generator: {0}")]
    Launch(String),

    #[error("Lost track of the timetable generator: {0}")]
    Supervision(String),

    #[error("Timetable generation timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        timeout: Duration,
        diagnostics: GenerationDiagnostics,
    },

    /// The generator ran but did not produce a usable workbook.
    #[error("{message}")]
    GenerationFailed {
        message: String,
        diagnostics: GenerationDiagnostics,
    },

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Captured generator output, when the failure has any.
    pub fn diagnostics(&self) -> Option<&GenerationDiagnostics> {
        match self {
            PipelineError::Timeout { diagnostics, .. }
            | PipelineError::GenerationFailed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }

    fn generation_failed(message: impl Into<String>, outcome: &GenerationOutcome) -> Self {
        PipelineError::GenerationFailed {
            message: message.into(),
            diagnostics: GenerationDiagnostics::from_outcome(outcome),
        }
    }
}

impl From<RunnerError> for PipelineError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Launch { .. } => PipelineError::Launch(err.to_string()),
            RunnerError::Supervision(e) => PipelineError::Supervision(e.to_string()),
            RunnerError::Timeout {
                timeout,
                stdout,
                stderr,
            } => PipelineError::Timeout {
                timeout,
                diagnostics: GenerationDiagnostics {
                    exit_code: None,
                    stdout,
                    stderr,
                },
            },
        }
    }
}

/// A dataset received from a client.
#[derive(Debug, Clone)]
pub struct UploadedDataset {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDataset {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// A validated workbook ready to be sent to the client.
#[derive(Debug)]
pub struct GeneratedArtifact {
    pub job_id: String,
    pub bytes: Vec<u8>,
    pub sha256: String,
    /// Generator exit code; non-zero only when partial output is accepted.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// Background task mirroring the artifact into the snapshot store and
    /// then removing the request's files.
    pub mirror: JoinHandle<()>,
}

impl GeneratedArtifact {
    pub fn is_partial(&self) -> bool {
        self.exit_code != Some(0)
    }
}

/// Tunables of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub max_concurrent: usize,
    pub queue_timeout: Duration,
    pub accept_partial_output: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            uploads_dir: config.storage.uploads_dir(),
            outputs_dir: config.storage.outputs_dir(),
            max_concurrent: config.generator.max_concurrent,
            queue_timeout: config.generator.queue_timeout(),
            accept_partial_output: config.generator.accept_partial_output,
        }
    }
}

/// Files and tracking state of one request.
struct RequestScope {
    job_id: String,
    tracker: JobTracker,
    input: Option<TransientFile>,
    output: Option<TransientFile>,
}

impl RequestScope {
    fn new(job_id: String, tracker: JobTracker) -> Self {
        Self {
            job_id,
            tracker,
            input: None,
            output: None,
        }
    }

    fn output_path(&self) -> Option<&Path> {
        self.output.as_ref().map(TransientFile::path)
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.input.take();
        self.output.take();
        self.tracker.mark_cleaned_up(&self.job_id);
    }
}

/// Runs generation requests against a [`Generator`].
#[derive(Clone)]
pub struct GenerationPipeline {
    generator: Arc<dyn Generator>,
    snapshot: Arc<dyn SnapshotStore>,
    tracker: JobTracker,
    limiter: Arc<Semaphore>,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(
        generator: Arc<dyn Generator>,
        snapshot: Arc<dyn SnapshotStore>,
        tracker: JobTracker,
        settings: PipelineSettings,
    ) -> Self {
        let permits = settings.max_concurrent.max(1);
        Self {
            generator,
            snapshot,
            tracker,
            limiter: Arc::new(Semaphore::new(permits)),
            settings,
        }
    }

    /// Create the transient directories.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.settings.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.settings.outputs_dir).await?;
        Ok(())
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Generate a timetable workbook from an uploaded dataset.
    pub async fn generate(&self, upload: UploadedDataset) -> Result<GeneratedArtifact, PipelineError> {
        let job_id = self
            .tracker
            .create_job(upload.file_name.clone(), upload.bytes.len() as u64);
        let span = tracing::info_span!("generation", job_id = %job_id);

        async move {
            info!(
                file_name = %upload.file_name,
                size_bytes = upload.bytes.len(),
                "Dataset received"
            );
            let mut scope = RequestScope::new(job_id.clone(), self.tracker.clone());

            match self.run(&mut scope, upload).await {
                Ok((bytes, outcome)) => {
                    let sha256 = calculate_checksum(&bytes);
                    self.tracker.complete_job(
                        &job_id,
                        serde_json::json!({
                            "exit_code": outcome.exit_code(),
                            "duration_secs": outcome.duration.as_secs_f64(),
                            "size_bytes": bytes.len(),
                            "sha256": sha256,
                        }),
                    );
                    self.tracker
                        .log(&job_id, LogLevel::Success, "Timetable generated");
                    info!(size_bytes = bytes.len(), "Streaming generated timetable");

                    let mirror = self.spawn_mirror(scope);
                    Ok(GeneratedArtifact {
                        job_id,
                        bytes,
                        sha256,
                        exit_code: outcome.exit_code(),
                        duration: outcome.duration,
                        mirror,
                    })
                }
                Err(e) => {
                    warn!("Generation failed: {}", e);
                    let result = e
                        .diagnostics()
                        .and_then(|d| serde_json::to_value(d).ok());
                    self.tracker.fail_job(&job_id, e.to_string(), result);
                    release(scope).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        scope: &mut RequestScope,
        upload: UploadedDataset,
    ) -> Result<(Vec<u8>, GenerationOutcome), PipelineError> {
        let job_id = scope.job_id.clone();
        validate_upload(&upload).await?;

        let input = self.settings.uploads_dir.join(format!(
            "{}-{}",
            job_id,
            sanitize_file_name(&upload.file_name)
        ));
        let input = scope.input.insert(TransientFile::new(input)).path().to_path_buf();
        tokio::fs::write(&input, &upload.bytes).await?;

        let permit = match tokio::time::timeout(
            self.settings.queue_timeout,
            self.limiter.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                return Err(PipelineError::Busy {
                    limit: self.settings.max_concurrent,
                })
            }
        };

        let output = self.settings.outputs_dir.join(format!(
            "generated_timetable_{}_{}.xlsx",
            chrono::Utc::now().timestamp_millis(),
            job_id
        ));
        let output = scope.output.insert(TransientFile::new(output)).path().to_path_buf();

        self.tracker.transition(&job_id, RequestState::Running);
        self.tracker
            .log(&job_id, LogLevel::Info, "Running timetable generator");
        let outcome = self.generator.run(&input, &output).await?;
        drop(permit);

        self.tracker.transition(&job_id, RequestState::Validating);
        self.tracker.log(
            &job_id,
            LogLevel::Info,
            format!(
                "Generator exited with {} after {:.2}s",
                outcome.status,
                outcome.duration.as_secs_f64()
            ),
        );
        self.validate_outcome(&outcome).await?;

        let bytes = tokio::fs::read(&output).await?;
        Ok((bytes, outcome))
    }

    /// Apply the success predicate: zero exit, output present, output non-empty.
    async fn validate_outcome(&self, outcome: &GenerationOutcome) -> Result<(), PipelineError> {
        let size = match tokio::fs::metadata(&outcome.output_path).await {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if !outcome.exited_successfully() {
            let status = outcome
                .exit_code()
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "a signal".to_string());
            return match size {
                Some(n) if n > 0 && self.settings.accept_partial_output => {
                    warn!(%status, "Generator failed but wrote output, serving it anyway");
                    Ok(())
                }
                Some(n) if n > 0 => Err(PipelineError::generation_failed(
                    format!("Timetable generator failed with {} after writing output", status),
                    outcome,
                )),
                _ => Err(PipelineError::generation_failed(
                    format!("Timetable generator failed with {}", status),
                    outcome,
                )),
            };
        }

        match size {
            None => Err(PipelineError::generation_failed(
                "Timetable file was not generated",
                outcome,
            )),
            Some(0) => Err(PipelineError::generation_failed(
                "Generated file is empty",
                outcome,
            )),
            Some(_) => Ok(()),
        }
    }

    fn spawn_mirror(&self, scope: RequestScope) -> JoinHandle<()> {
        let store = self.snapshot.clone();
        let tracker = self.tracker.clone();
        let span = tracing::info_span!("mirror", job_id = %scope.job_id);

        tokio::spawn(
            async move {
                if let Some(path) = scope.output_path() {
                    match store.replace(path).await {
                        Ok(info) => tracker.log(
                            &scope.job_id,
                            LogLevel::Info,
                            format!("Saved as latest timetable ({})", info.sha256),
                        ),
                        Err(e) => {
                            warn!("Failed to save latest timetable: {}", e);
                            tracker.log(
                                &scope.job_id,
                                LogLevel::Warning,
                                format!("Failed to save latest timetable: {}", e),
                            );
                        }
                    }
                }
                release(scope).await;
            }
            .instrument(span),
        )
    }
}

/// Drop the scope on the blocking pool so file removal stays off the async
/// workers.
async fn release(scope: RequestScope) {
    if let Err(e) = tokio::task::spawn_blocking(move || drop(scope)).await {
        warn!("Request cleanup task failed: {}", e);
    }
}

/// Reject uploads that are empty or not a readable workbook.
async fn validate_upload(upload: &UploadedDataset) -> Result<(), PipelineError> {
    if upload.bytes.is_empty() {
        return Err(PipelineError::BadRequest("Uploaded file is empty".to_string()));
    }

    let bytes = upload.bytes.clone();
    let decoded = tokio::task::spawn_blocking(move || workbook::decode_bytes(&bytes))
        .await
        .map_err(|e| PipelineError::Internal(format!("Task join error: {}", e)))?;

    match decoded {
        Ok(book) if book.sheets.iter().all(|s| s.rows.is_empty()) => Err(
            PipelineError::BadRequest("Uploaded workbook contains no data".to_string()),
        ),
        Ok(_) => Ok(()),
        Err(WorkbookError::MalformedInput(msg)) => Err(PipelineError::BadRequest(format!(
            "Uploaded file is not a readable workbook: {}",
            msg
        ))),
        Err(e) => Err(PipelineError::Internal(e.to_string())),
    }
}
