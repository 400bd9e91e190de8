//! Data Transfer Objects for the HTTP API.
//!
//! The timetable payload itself is [`TimetableSet`], serialized as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::services::job_tracker::{Job, LogEntry};
pub use crate::services::TimetableSet;
pub use crate::snapshot::SnapshotInfo;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Crate version
    pub version: String,
    /// Current server time
    pub timestamp: DateTime<Utc>,
    /// Whether a latest timetable has been saved
    pub snapshot_available: bool,
    /// Generation requests not yet cleaned up
    pub active_jobs: usize,
}

/// Response for a snapshot replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveLatestResponse {
    pub message: String,
    pub snapshot: SnapshotInfo,
}

/// Job list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    /// Retained jobs, newest first
    pub jobs: Vec<Job>,
    /// Total count
    pub total: usize,
}
