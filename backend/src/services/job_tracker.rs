//! Tracking of generation requests.
//!
//! Every generation request is registered here so its progress through the
//! pipeline (and the diagnostics of a failure) can be inspected afterwards.
//! Only the most recent requests are retained.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Pipeline stage of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Running,
    Validating,
    Streaming,
    Failed,
    CleanedUp,
}

/// Overall verdict of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Succeeded,
    Failed,
}

/// Job metadata and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub file_name: String,
    pub upload_size: u64,
    pub status: JobStatus,
    pub state: RequestState,
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Outcome details: exit code, duration, artifact checksum or failure.
    pub result: Option<serde_json::Value>,
}

#[derive(Default)]
struct JobTable {
    jobs: HashMap<String, Job>,
    order: VecDeque<String>,
}

/// In-memory job tracker.
#[derive(Clone)]
pub struct JobTracker {
    table: Arc<RwLock<JobTable>>,
    capacity: usize,
}

impl JobTracker {
    /// Create a tracker keeping at most `capacity` finished jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Arc::new(RwLock::new(JobTable::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new request and return its ID.
    pub fn create_job(&self, file_name: impl Into<String>, upload_size: u64) -> String {
        let job_id = Uuid::new_v4().to_string();
        let job = Job {
            job_id: job_id.clone(),
            file_name: file_name.into(),
            upload_size,
            status: JobStatus::Active,
            state: RequestState::Received,
            logs: vec![],
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        };

        let mut table = self.table.write();
        table.jobs.insert(job_id.clone(), job);
        table.order.push_back(job_id.clone());
        self.evict(&mut table);
        job_id
    }

    /// Drop the oldest cleaned-up jobs beyond capacity. Active jobs are kept.
    fn evict(&self, table: &mut JobTable) {
        while table.jobs.len() > self.capacity {
            let position = table.order.iter().position(|id| {
                table
                    .jobs
                    .get(id)
                    .is_some_and(|j| j.state == RequestState::CleanedUp)
            });
            match position.and_then(|p| table.order.remove(p)) {
                Some(id) => {
                    table.jobs.remove(&id);
                }
                None => break,
            }
        }
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.table.write().jobs.get_mut(job_id) {
            f(job);
        }
    }

    /// Add a log entry to a job.
    pub fn log(&self, job_id: &str, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.update(job_id, |job| {
            job.logs.push(LogEntry {
                timestamp: Utc::now(),
                level,
                message,
            });
        });
    }

    /// Move a job to the next pipeline stage.
    pub fn transition(&self, job_id: &str, state: RequestState) {
        self.update(job_id, |job| job.state = state);
    }

    /// Mark a job as succeeded with its result.
    pub fn complete_job(&self, job_id: &str, result: serde_json::Value) {
        self.update(job_id, |job| {
            job.status = JobStatus::Succeeded;
            job.state = RequestState::Streaming;
            job.result = Some(result);
        });
    }

    /// Mark a job as failed.
    pub fn fail_job(
        &self,
        job_id: &str,
        error_message: impl Into<String>,
        result: Option<serde_json::Value>,
    ) {
        let message = error_message.into();
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.state = RequestState::Failed;
            job.result = result;
            job.logs.push(LogEntry {
                timestamp: Utc::now(),
                level: LogLevel::Error,
                message,
            });
        });
    }

    /// Record that every transient file of the job has been removed.
    pub fn mark_cleaned_up(&self, job_id: &str) {
        self.update(job_id, |job| {
            job.state = RequestState::CleanedUp;
            job.completed_at = Some(Utc::now());
            if job.status == JobStatus::Active {
                job.status = JobStatus::Failed;
            }
        });
    }

    /// Get a job by ID.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.table.read().jobs.get(job_id).cloned()
    }

    /// All retained jobs, newest first.
    pub fn list_jobs(&self) -> Vec<Job> {
        let table = self.table.read();
        table
            .order
            .iter()
            .rev()
            .filter_map(|id| table.jobs.get(id).cloned())
            .collect()
    }

    /// Number of jobs not yet cleaned up.
    pub fn active_count(&self) -> usize {
        self.table
            .read()
            .jobs
            .values()
            .filter(|j| j.state != RequestState::CleanedUp)
            .count()
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(100)
    }
}
