//! Reading and replacing the latest timetable snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::pipeline::UploadedDataset;
use super::transient::{sanitize_file_name, TransientFile};
use crate::schedule::{self, ScheduleSheet, SheetClassification};
use crate::snapshot::{SnapshotError, SnapshotInfo, SnapshotStore};
use crate::workbook::{self, WorkbookError};

/// Message returned while no snapshot exists.
pub const NO_SNAPSHOT_MESSAGE: &str =
    "No timetable data available. Please generate timetables first.";

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Stored timetable is unreadable: {0}")]
    MalformedSnapshot(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Timetables of the latest snapshot, split by classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableSet {
    pub teachers: BTreeMap<String, ScheduleSheet>,
    pub classes: BTreeMap<String, ScheduleSheet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TimetableSet {
    fn unavailable() -> Self {
        Self {
            message: Some(NO_SNAPSHOT_MESSAGE.to_string()),
            ..Self::default()
        }
    }
}

/// Decode and classify the latest snapshot.
///
/// A missing snapshot is not an error: the result is empty and carries
/// [`NO_SNAPSHOT_MESSAGE`].
pub async fn load_latest(store: &dyn SnapshotStore) -> Result<TimetableSet, TimetableError> {
    let path = match store.read().await {
        Ok(path) => path,
        Err(SnapshotError::NotFound) => return Ok(TimetableSet::unavailable()),
        Err(e) => return Err(e.into()),
    };

    let book = tokio::task::spawn_blocking(move || workbook::decode(&path))
        .await
        .map_err(|e| TimetableError::Internal(format!("Task join error: {}", e)))?
        .map_err(|e| match e {
            WorkbookError::MalformedInput(msg) => TimetableError::MalformedSnapshot(msg),
            other => TimetableError::MalformedSnapshot(other.to_string()),
        })?;

    let mut set = TimetableSet::default();
    for sheet in schedule::classify(&book) {
        let target = match sheet.classification {
            SheetClassification::Teacher => &mut set.teachers,
            SheetClassification::Class => &mut set.classes,
        };
        target.insert(sheet.name, sheet.schedule);
    }
    Ok(set)
}

/// Replace the latest snapshot with an uploaded workbook.
///
/// The upload is written to `uploads_dir`, checked to be a readable
/// workbook, copied into the store and removed again.
pub async fn save_latest(
    store: &dyn SnapshotStore,
    uploads_dir: &Path,
    upload: UploadedDataset,
) -> Result<SnapshotInfo, TimetableError> {
    if upload.bytes.is_empty() {
        return Err(TimetableError::BadRequest("No file provided".to_string()));
    }

    tokio::fs::create_dir_all(uploads_dir).await?;
    let staged = TransientFile::new(uploads_dir.join(format!(
        "latest-{}-{}",
        Uuid::new_v4(),
        sanitize_file_name(&upload.file_name)
    )));
    tokio::fs::write(staged.path(), &upload.bytes).await?;

    let bytes = upload.bytes;
    tokio::task::spawn_blocking(move || workbook::decode_bytes(&bytes))
        .await
        .map_err(|e| TimetableError::Internal(format!("Task join error: {}", e)))?
        .map_err(|e| {
            TimetableError::BadRequest(format!("Uploaded file is not a readable workbook: {}", e))
        })?;

    let info = store.replace(staged.path()).await?;
    info!(file_name = %upload.file_name, sha256 = %info.sha256, "Latest timetable saved");
    Ok(info)
}
