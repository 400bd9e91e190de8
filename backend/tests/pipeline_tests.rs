#![cfg(unix)]

mod support;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use support::{dir_entries, roster_bytes, shell_generator, Harness};
use timetable_service::services::{
    JobStatus, PipelineError, PipelineSettings, RequestState, UploadedDataset,
};
use timetable_service::snapshot::{SnapshotError, SnapshotInfo, SnapshotResult, SnapshotStore};

fn upload() -> UploadedDataset {
    UploadedDataset::new("roster.xlsx", roster_bytes())
}

fn assert_no_transient_files(harness: &Harness) {
    assert!(
        dir_entries(&harness.uploads_dir()).is_empty(),
        "uploads left behind: {:?}",
        dir_entries(&harness.uploads_dir())
    );
    assert!(
        dir_entries(&harness.outputs_dir()).is_empty(),
        "outputs left behind: {:?}",
        dir_entries(&harness.outputs_dir())
    );
}

#[tokio::test]
async fn test_success_returns_generated_bytes_and_cleans_up() {
    let harness = Harness::new(r#"printf 'generated workbook' > "$2""#).await;

    let artifact = harness.pipeline.generate(upload()).await.unwrap();
    assert_eq!(artifact.bytes, b"generated workbook");
    assert_eq!(artifact.exit_code, Some(0));
    assert!(!artifact.is_partial());

    let job_id = artifact.job_id.clone();
    artifact.mirror.await.unwrap();

    assert_no_transient_files(&harness);
    let job = harness.pipeline.tracker().get_job(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.state, RequestState::CleanedUp);
    assert_eq!(job.file_name, "roster.xlsx");
}

#[tokio::test]
async fn test_success_mirrors_artifact_into_snapshot() {
    let harness = Harness::new(r#"cp "$1" "$2""#).await;

    let artifact = harness.pipeline.generate(upload()).await.unwrap();
    let sha256 = artifact.sha256.clone();
    artifact.mirror.await.unwrap();

    let path = harness.snapshot.read().await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), roster_bytes());
    assert_eq!(harness.snapshot.info().await.unwrap().sha256, sha256);
}

#[tokio::test]
async fn test_stderr_warnings_do_not_fail_successful_run() {
    let harness =
        Harness::new(r#"echo 'FutureWarning: deprecated option' >&2; cp "$1" "$2""#).await;

    let artifact = harness.pipeline.generate(upload()).await.unwrap();

    assert_eq!(artifact.bytes, roster_bytes());
}

#[tokio::test]
async fn test_exit_zero_without_output_is_generation_failure() {
    let harness = Harness::new("exit 0").await;

    let err = harness.pipeline.generate(upload()).await.unwrap_err();

    match &err {
        PipelineError::GenerationFailed { message, diagnostics } => {
            assert_eq!(message, "Timetable file was not generated");
            assert_eq!(diagnostics.exit_code, Some(0));
        }
        other => panic!("expected GenerationFailed, got {:?}", other),
    }
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_zero_byte_output_is_generation_failure_and_removed() {
    let harness = Harness::new(r#": > "$2""#).await;

    let err = harness.pipeline.generate(upload()).await.unwrap_err();

    assert!(
        matches!(err, PipelineError::GenerationFailed { ref message, .. } if message == "Generated file is empty")
    );
    assert_no_transient_files(&harness);
    assert!(matches!(
        harness.snapshot.read().await,
        Err(SnapshotError::NotFound)
    ));
}

#[tokio::test]
async fn test_crash_reports_diagnostics_and_cleans_up() {
    let harness = Harness::new(
        "echo 'Loading roster'; echo 'KeyError: Class' >&2; exit 3",
    )
    .await;

    let err = harness.pipeline.generate(upload()).await.unwrap_err();

    let diagnostics = err.diagnostics().expect("diagnostics").clone();
    assert!(matches!(err, PipelineError::GenerationFailed { .. }));
    assert_eq!(diagnostics.exit_code, Some(3));
    assert_eq!(diagnostics.stdout.trim(), "Loading roster");
    assert_eq!(diagnostics.stderr.trim(), "KeyError: Class");
    assert_no_transient_files(&harness);

    let job = &harness.pipeline.tracker().list_jobs()[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.state, RequestState::CleanedUp);
    assert_eq!(job.result.as_ref().unwrap()["exit_code"], 3);
}

#[tokio::test]
async fn test_nonzero_exit_with_output_fails_by_default() {
    let harness = Harness::new(r#"cp "$1" "$2"; exit 2"#).await;

    let err = harness.pipeline.generate(upload()).await.unwrap_err();

    match err {
        PipelineError::GenerationFailed { message, diagnostics } => {
            assert!(message.contains("after writing output"), "{}", message);
            assert_eq!(diagnostics.exit_code, Some(2));
        }
        other => panic!("expected GenerationFailed, got {:?}", other),
    }
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_nonzero_exit_with_output_served_when_partial_accepted() {
    let harness = Harness::with(r#"cp "$1" "$2"; exit 2"#, |s| {
        s.accept_partial_output = true;
    })
    .await;

    let artifact = harness.pipeline.generate(upload()).await.unwrap();

    assert_eq!(artifact.bytes, roster_bytes());
    assert_eq!(artifact.exit_code, Some(2));
    assert!(artifact.is_partial());
    artifact.mirror.await.unwrap();
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_nonzero_exit_without_output_fails_even_when_partial_accepted() {
    let harness = Harness::with("exit 1", |s| s.accept_partial_output = true).await;

    let err = harness.pipeline.generate(upload()).await.unwrap_err();

    assert!(matches!(err, PipelineError::GenerationFailed { .. }));
}

#[tokio::test]
async fn test_empty_upload_is_bad_request() {
    let harness = Harness::new(r#"cp "$1" "$2""#).await;

    let err = harness
        .pipeline
        .generate(UploadedDataset::new("roster.xlsx", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::BadRequest(_)));
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_non_workbook_upload_is_bad_request_and_generator_not_run() {
    let harness = Harness::new(r#"touch "$0.ran"; cp "$1" "$2""#).await;

    let err = harness
        .pipeline
        .generate(UploadedDataset::new("roster.csv", b"Class,Teacher\n10A,Smith\n".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::BadRequest(ref m) if m.contains("not a readable workbook")));
    assert!(!harness.dir.path().join("generator.ran").exists());
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_launch_failure_cleans_up_input() {
    let harness = Harness::new("unused").await;
    let pipeline = Harness::pipeline_for(
        Arc::new(timetable_service::generator::ProcessGenerator::new(
            "/nonexistent/timetable-generator",
            vec![],
            harness.dir.path(),
            Duration::from_secs(1),
        )),
        harness.snapshot.clone(),
        harness.pipeline.settings().clone(),
    );

    let err = pipeline.generate(upload()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Launch(_)));
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_timeout_kills_generator_and_cleans_up() {
    let harness = Harness::new("unused").await;
    let pipeline = Harness::pipeline_for(
        shell_generator(
            r#"printf partial > "$2"; exec sleep 30"#,
            harness.dir.path(),
            Duration::from_millis(300),
        ),
        harness.snapshot.clone(),
        harness.pipeline.settings().clone(),
    );

    let err = pipeline.generate(upload()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Timeout { .. }));
    assert_eq!(err.to_string(), "Timetable generation timed out after 0.3s");
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_busy_when_no_generator_slot_frees_up() {
    let harness = Harness::with(r#"sleep 2; cp "$1" "$2""#, |s| {
        s.max_concurrent = 1;
        s.queue_timeout = Duration::from_millis(100);
    })
    .await;

    let first = {
        let pipeline = harness.pipeline.clone();
        tokio::spawn(async move { pipeline.generate(upload()).await })
    };
    // Let the first request take the only slot.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let err = harness.pipeline.generate(upload()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Busy { limit: 1 }));

    let artifact = first.await.unwrap().unwrap();
    artifact.mirror.await.unwrap();
    assert_no_transient_files(&harness);
}

#[tokio::test]
async fn test_concurrent_requests_use_distinct_paths() {
    let harness = Harness::new(r#"sleep 0.2; cp "$1" "$2""#).await;

    let a = harness.pipeline.generate(UploadedDataset::new("a.xlsx", roster_bytes()));
    let b = harness.pipeline.generate(UploadedDataset::new("a.xlsx", roster_bytes()));
    let (a, b) = tokio::join!(a, b);
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.job_id, b.job_id);
    a.mirror.await.unwrap();
    b.mirror.await.unwrap();
    assert_no_transient_files(&harness);
}

struct FailingSnapshotStore;

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn replace(&self, _source: &Path) -> SnapshotResult<SnapshotInfo> {
        Err(SnapshotError::Io(std::io::Error::other("disk full")))
    }

    async fn read(&self) -> SnapshotResult<PathBuf> {
        Err(SnapshotError::NotFound)
    }

    async fn info(&self) -> SnapshotResult<SnapshotInfo> {
        Err(SnapshotError::NotFound)
    }
}

#[tokio::test]
async fn test_snapshot_failure_does_not_fail_response() {
    let harness = Harness::new("unused").await;
    let pipeline = Harness::pipeline_for(
        shell_generator(r#"cp "$1" "$2""#, harness.dir.path(), Duration::from_secs(10)),
        Arc::new(FailingSnapshotStore),
        PipelineSettings {
            uploads_dir: harness.uploads_dir(),
            outputs_dir: harness.outputs_dir(),
            max_concurrent: 1,
            queue_timeout: Duration::from_secs(1),
            accept_partial_output: false,
        },
    );

    let artifact = pipeline.generate(upload()).await.unwrap();
    let job_id = artifact.job_id.clone();
    assert_eq!(artifact.bytes, roster_bytes());
    artifact.mirror.await.unwrap();

    assert_no_transient_files(&harness);
    let job = pipeline.tracker().get_job(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job
        .logs
        .iter()
        .any(|l| l.message.contains("Failed to save latest timetable")));
}
