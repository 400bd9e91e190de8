//! Subprocess-backed generator.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{GenerationOutcome, Generator, RunnerError, RunnerResult};
use crate::config::GeneratorSettings;

/// How long to keep reading pipes once the child has exited or was killed.
/// Processes it left running in the background may still hold them open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs the generator as a child process.
#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ProcessGenerator {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &GeneratorSettings) -> Self {
        Self::new(
            settings.program.clone(),
            settings.args.clone(),
            settings.working_dir.clone(),
            settings.timeout(),
        )
    }
}

#[async_trait]
impl Generator for ProcessGenerator {
    async fn run(&self, input: &Path, output: &Path) -> RunnerResult<GenerationOutcome> {
        info!(
            program = %self.program,
            input = %input.display(),
            output = %output.display(),
            "Launching generator"
        );
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Launch {
                program: self.program.clone(),
                source,
            })?;

        // Both pipes are drained while the child runs so it never blocks on a
        // full pipe buffer.
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout_reader.task.abort();
                stderr_reader.task.abort();
                return Err(RunnerError::Supervision(e));
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Generator exceeded its deadline, killing it"
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill generator: {}", e);
                }
                let (stdout, stderr) = tokio::join!(collect(stdout_reader), collect(stderr_reader));
                return Err(RunnerError::Timeout {
                    timeout: self.timeout,
                    stdout,
                    stderr,
                });
            }
        };

        let (stdout, stderr) = tokio::join!(collect(stdout_reader), collect(stderr_reader));
        let duration = started.elapsed();

        if !stdout.is_empty() {
            debug!(target: "generator::stdout", "{}", stdout.trim_end());
        }
        if !stderr.is_empty() {
            debug!(target: "generator::stderr", "{}", stderr.trim_end());
        }
        info!(
            status = %status,
            duration_secs = duration.as_secs_f64(),
            "Generator finished"
        );

        Ok(GenerationOutcome {
            status,
            stdout,
            stderr,
            duration,
            output_path: output.to_path_buf(),
        })
    }
}

/// A pipe being read in the background. Whatever was read so far stays
/// available even if the reader never reaches end-of-file.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn drain<R>(stream: Option<R>) -> PipeReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = buf.clone();
    let task = tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!("Failed to read generator output: {}", e);
                    break;
                }
            }
        }
    });
    PipeReader { buf, task }
}

/// Wait up to [`DRAIN_GRACE`] for the pipe to close, then return what was read.
async fn collect(mut reader: PipeReader) -> String {
    match timeout(DRAIN_GRACE, &mut reader.task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Generator output reader failed: {}", e),
        Err(_) => {
            reader.task.abort();
            debug!("Generator output pipe still open after exit, keeping partial output");
        }
    }
    let bytes = std::mem::take(&mut *reader.buf.lock());
    String::from_utf8_lossy(&bytes).into_owned()
}
