//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive for the browser UI
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Generation
        .route("/timetables/generate", post(handlers::generate_timetable))
        // Latest snapshot
        .route("/timetables", get(handlers::get_timetables))
        .route(
            "/timetables/latest",
            get(handlers::get_latest_info).post(handlers::save_latest_timetable),
        )
        // Generation requests
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/{job_id}", get(handlers::get_job_status));

    let body_limit = state.body_limit;

    Router::new()
        .route("/health", get(handlers::health_check))
        // Paths used by the existing web UI
        .route("/generate-timetable", post(handlers::generate_timetable))
        .route("/get-timetables", get(handlers::get_timetables))
        .route("/save-latest-timetable", post(handlers::save_latest_timetable))
        .nest("/v1", api_v1)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
