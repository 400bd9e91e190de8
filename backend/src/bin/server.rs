//! Timetable HTTP Server Binary
//!
//! Loads the configuration, prepares the working directories and serves the
//! REST API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin timetable-server
//!
//! GENERATOR_PROGRAM=/usr/local/bin/scheduler PORT=8080 \
//!   cargo run --bin timetable-server
//! ```
//!
//! # Environment Variables
//!
//! - `TIMETABLE_CONFIG`: Path to a `timetable.toml` file
//! - `HOST`, `PORT`: Listen address (default: 0.0.0.0:5000)
//! - `GENERATOR_PROGRAM`, `GENERATOR_TIMEOUT_SECS`, `GENERATOR_MAX_CONCURRENT`
//! - `TIMETABLE_WORK_DIR`, `TIMETABLE_SNAPSHOT_PATH`
//! - `RUST_LOG`: Log filter directives (default: info)

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use timetable_service::config::ServiceConfig;
use timetable_service::http::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting timetable server");

    let config = ServiceConfig::load()?;
    info!(
        program = %config.generator.program,
        max_concurrent = config.generator.max_concurrent,
        timeout_secs = config.generator.timeout_secs,
        "Generator configured"
    );

    let state = AppState::from_config(&config);
    state.pipeline.prepare().await?;
    info!(
        work_dir = %config.storage.work_dir.display(),
        snapshot = %config.storage.snapshot_path.display(),
        "Storage ready"
    );

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the log filter from `RUST_LOG` directives such as
/// `timetable_service=debug,tower_http=info`, defaulting to `info`.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
