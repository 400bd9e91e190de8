//! Service layer for business logic and orchestration.
//!
//! The HTTP handlers are thin wrappers around the functions here:
//!
//! - [`pipeline`]: upload -> external generator -> validated artifact
//! - [`timetables`]: reading and replacing the latest snapshot
//! - [`job_tracker`]: progress and diagnostics of generation requests

pub mod checksum;
pub mod job_tracker;
pub mod pipeline;
pub mod timetables;
pub mod transient;

pub use job_tracker::{Job, JobStatus, JobTracker, RequestState};
pub use pipeline::{
    GeneratedArtifact, GenerationDiagnostics, GenerationPipeline, PipelineError,
    PipelineSettings, UploadedDataset, ARTIFACT_FILE_NAME,
};
pub use timetables::{load_latest, save_latest, TimetableError, TimetableSet};
