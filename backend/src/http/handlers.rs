//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! service layer for business logic.

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use super::dto::{HealthResponse, JobListResponse, SaveLatestResponse, TimetableSet};
use super::error::AppError;
use super::state::AppState;
use crate::services::{self, Job, UploadedDataset, ARTIFACT_FILE_NAME};
use crate::snapshot::{SnapshotError, SnapshotInfo};
use crate::workbook::XLSX_CONTENT_TYPE;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Multipart field carrying the uploaded workbook.
const FILE_FIELD: &str = "file";

/// Read the `file` field of a multipart upload.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadedDataset, AppError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("dataset.xlsx").to_string();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        return Ok(UploadedDataset::new(file_name, bytes.to_vec()));
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let snapshot_available = match state.snapshot.read().await {
        Ok(_) => true,
        Err(SnapshotError::NotFound) => false,
        Err(e) => return Err(e.into()),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        snapshot_available,
        active_jobs: state.pipeline.tracker().active_count(),
    }))
}

// =============================================================================
// Timetable Generation
// =============================================================================

/// POST /v1/timetables/generate
///
/// Run the generator on the uploaded dataset and return the produced
/// workbook as a download.
pub async fn generate_timetable(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let upload = read_upload(multipart).await?;
    info!(file_name = %upload.file_name, "File upload received");

    let artifact = state.pipeline.generate(upload).await?;

    let mut response = (
        StatusCode::OK,
        [
            (CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", ARTIFACT_FILE_NAME),
            ),
        ],
        Body::from(artifact.bytes),
    )
        .into_response();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&artifact.job_id) {
        headers.insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&artifact.sha256) {
        headers.insert("x-artifact-sha256", value);
    }
    if artifact.exit_code != Some(0) {
        let code = artifact
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        if let Ok(value) = HeaderValue::from_str(&code) {
            headers.insert("x-generator-exit-code", value);
        }
    }

    Ok(response)
}

// =============================================================================
// Latest Snapshot
// =============================================================================

/// GET /v1/timetables
///
/// Teacher and class timetables of the latest snapshot.
pub async fn get_timetables(State(state): State<AppState>) -> HandlerResult<TimetableSet> {
    let set = services::load_latest(state.snapshot.as_ref()).await?;
    Ok(Json(set))
}

/// POST /v1/timetables/latest
///
/// Replace the latest snapshot with the uploaded workbook.
pub async fn save_latest_timetable(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> HandlerResult<SaveLatestResponse> {
    let upload = read_upload(multipart).await?;
    let snapshot =
        services::save_latest(state.snapshot.as_ref(), &state.uploads_dir(), upload).await?;

    Ok(Json(SaveLatestResponse {
        message: "Latest timetable saved successfully".to_string(),
        snapshot,
    }))
}

/// GET /v1/timetables/latest
///
/// Size, modification time and checksum of the latest snapshot.
pub async fn get_latest_info(State(state): State<AppState>) -> HandlerResult<SnapshotInfo> {
    let info = state.snapshot.info().await?;
    Ok(Json(info))
}

// =============================================================================
// Generation Requests
// =============================================================================

/// GET /v1/jobs
pub async fn list_jobs(State(state): State<AppState>) -> HandlerResult<JobListResponse> {
    let jobs = state.pipeline.tracker().list_jobs();
    let total = jobs.len();
    Ok(Json(JobListResponse { jobs, total }))
}

/// GET /v1/jobs/{job_id}
///
/// State, logs and result of one generation request.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> HandlerResult<Job> {
    let job = state
        .pipeline
        .tracker()
        .get_job(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

    Ok(Json(job))
}
