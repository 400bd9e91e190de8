//! Latest-snapshot store.
//!
//! Holds the single most recently generated workbook. Replacing it is
//! all-or-nothing: readers either see the previous file or the new one.

mod file;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use file::FileSnapshotStore;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// No snapshot has been written yet.
    #[error("No timetable snapshot has been saved yet")]
    NotFound,

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata describing the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub size_bytes: u64,
    pub updated_at: DateTime<Utc>,
    pub sha256: String,
}

/// Storage for the latest generated workbook.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the snapshot with a copy of `source`.
    async fn replace(&self, source: &Path) -> SnapshotResult<SnapshotInfo>;

    /// Path of the current snapshot, or [`SnapshotError::NotFound`].
    async fn read(&self) -> SnapshotResult<PathBuf>;

    /// Metadata of the current snapshot.
    async fn info(&self) -> SnapshotResult<SnapshotInfo>;
}
