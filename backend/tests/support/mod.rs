#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use timetable_service::generator::{Generator, ProcessGenerator};
use timetable_service::services::{GenerationPipeline, JobTracker, PipelineSettings};
use timetable_service::snapshot::{FileSnapshotStore, SnapshotStore};
use timetable_service::workbook::{self, Sheet, Workbook};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// A class/teacher roster as uploaded by the admin UI.
pub fn roster_bytes() -> Vec<u8> {
    let book = Workbook::new(vec![Sheet::new(
        "Sheet1",
        vec![
            row(&["Class", "Mr Smith", "Ms Jones"]),
            row(&["10A", "4", "2"]),
            row(&["11B", "", "5"]),
        ],
    )]);
    workbook::encode(&book).expect("encode roster")
}

/// A generated workbook with one teacher sheet, one class sheet and a summary.
pub fn timetable_workbook() -> Workbook {
    let header = row(&["", "P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8"]);
    Workbook::new(vec![
        Sheet::new(
            "Mr Smith",
            vec![
                header.clone(),
                row(&["Monday", "10A", "", "11B"]),
                row(&["Tuesday", "", "10A"]),
            ],
        ),
        Sheet::new(
            "10A",
            vec![
                header.clone(),
                row(&["Monday", "Mr Smith", "Ms Jones"]),
                row(&["Tuesday", "Ms Jones", "Mr Smith"]),
            ],
        ),
        Sheet::new(
            "Summary",
            vec![row(&["Teacher", "Load"]), row(&["Mr Smith", "3"])],
        ),
    ])
}

pub fn timetable_bytes() -> Vec<u8> {
    workbook::encode(&timetable_workbook()).expect("encode timetable")
}

/// A generator running `script` through `sh -c`; `$1` is the input path and
/// `$2` the output path.
pub fn shell_generator(script: &str, dir: &Path, timeout: Duration) -> Arc<dyn Generator> {
    Arc::new(ProcessGenerator::new(
        "sh",
        vec!["-c".to_string(), script.to_string(), "generator".to_string()],
        dir,
        timeout,
    ))
}

/// A pipeline rooted in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub pipeline: GenerationPipeline,
    pub snapshot: Arc<FileSnapshotStore>,
}

impl Harness {
    pub async fn new(script: &str) -> Self {
        Self::with(script, |_| {}).await
    }

    pub async fn with(script: &str, tweak: impl FnOnce(&mut PipelineSettings)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = PipelineSettings {
            uploads_dir: dir.path().join("uploads"),
            outputs_dir: dir.path().join("outputs"),
            max_concurrent: 4,
            queue_timeout: Duration::from_secs(5),
            accept_partial_output: false,
        };
        tweak(&mut settings);

        let snapshot = Arc::new(FileSnapshotStore::new(dir.path().join("latest_timetables.xlsx")));
        let pipeline = Self::pipeline_for(
            shell_generator(script, dir.path(), Duration::from_secs(10)),
            snapshot.clone(),
            settings,
        );
        pipeline.prepare().await.expect("prepare dirs");

        Self {
            dir,
            pipeline,
            snapshot,
        }
    }

    pub fn pipeline_for(
        generator: Arc<dyn Generator>,
        snapshot: Arc<dyn SnapshotStore>,
        settings: PipelineSettings,
    ) -> GenerationPipeline {
        GenerationPipeline::new(generator, snapshot, JobTracker::new(50), settings)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.dir.path().join("outputs")
    }
}

/// File names currently present in `dir`.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => vec![],
    }
}
