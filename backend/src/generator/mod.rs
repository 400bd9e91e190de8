//! External timetable generator.
//!
//! The scheduling algorithm lives in an external executable invoked as
//! `<program> [args...] <input> <output>`. This module supervises one run of
//! it and reports what happened; it never touches the input or output files.

mod process;


use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;

pub use process::ProcessGenerator;

/// Result type for generator runs.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Terminal result of one generator run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub output_path: PathBuf,
}

impl GenerationOutcome {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn exited_successfully(&self) -> bool {
        self.status.success()
    }
}

/// Failures that prevent a run from producing an outcome.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The executable could not be started.
    #[error("Failed to launch generator '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but could not be waited on.
    #[error("Failed to supervise generator: {0}")]
    Supervision(#[source] std::io::Error),

    /// The process outlived its deadline and was killed.
    #[error("Generator timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

/// Something that turns an input workbook into an output workbook.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run once with the given input and output paths.
    async fn run(&self, input: &Path, output: &Path) -> RunnerResult<GenerationOutcome>;
}
