//! Snapshot kept as a single file at a fixed path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use super::{SnapshotError, SnapshotInfo, SnapshotResult, SnapshotStore};
use crate::services::checksum::calculate_checksum;

/// Stores the snapshot at `path`.
///
/// New content is copied to a uniquely named sibling file first and then
/// renamed over `path`; the rename is atomic on one filesystem.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn replace(&self, source: &Path) -> SnapshotResult<SnapshotInfo> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Metadata comes from the staged copy so it describes this write even
        // when another writer renames over the snapshot right after us.
        let staging = self.staging_path();
        let staged = async {
            fs::copy(source, &staging).await?;
            let info = describe(&staging).await?;
            fs::rename(&staging, &self.path).await?;
            Ok::<_, std::io::Error>(info)
        }
        .await;

        let info = match staged {
            Ok(info) => info,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staging).await {
                    if cleanup.kind() != ErrorKind::NotFound {
                        warn!(path = %staging.display(), "Failed to remove staging file: {}", cleanup);
                    }
                }
                return Err(e.into());
            }
        };
        info!(
            path = %self.path.display(),
            size_bytes = info.size_bytes,
            "Replaced timetable snapshot"
        );
        Ok(info)
    }

    async fn read(&self) -> SnapshotResult<PathBuf> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(self.path.clone()),
            Ok(_) => Err(SnapshotError::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SnapshotError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn info(&self) -> SnapshotResult<SnapshotInfo> {
        let path = self.read().await?;
        match describe(&path).await {
            Ok(info) => Ok(info),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SnapshotError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

async fn describe(path: &Path) -> std::io::Result<SnapshotInfo> {
    let content = fs::read(path).await?;
    let updated_at: DateTime<Utc> = fs::metadata(path).await?.modified()?.into();
    Ok(SnapshotInfo {
        size_bytes: content.len() as u64,
        updated_at,
        sha256: calculate_checksum(&content),
    })
}
