//! Service configuration.
//!
//! Settings are read from a `timetable.toml` file (optional) and then
//! overridden by environment variables.
//!
//! ```toml
//! [server]
//! port = 5000
//!
//! [generator]
//! program = "python"
//! args = ["timetablegenerator.py"]
//! timeout_secs = 300
//! max_concurrent = 4
//!
//! [storage]
//! work_dir = "/var/lib/timetable"
//! snapshot_path = "/var/lib/timetable/latest_timetables.xlsx"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

/// External generator invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Executable to launch.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the input and output paths.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on generators running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// How long a request may wait for a free generator slot.
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
    /// Serve the output of a generator that exited non-zero but still wrote
    /// a non-empty workbook.
    #[serde(default)]
    pub accept_partial_output: bool,
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Parent of the `uploads/` and `outputs/` transient directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Number of generation requests kept for inspection.
    #[serde(default = "default_job_history")]
    pub job_history: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_body_limit_mb() -> usize {
    50
}

fn default_program() -> String {
    "python".to_string()
}

fn default_args() -> Vec<String> {
    vec!["timetablegenerator.py".to_string()]
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_timeout_secs() -> u64 {
    30
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("latest_timetables.xlsx")
}

fn default_job_history() -> usize {
    100
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: default_working_dir(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            queue_timeout_secs: default_queue_timeout_secs(),
            accept_partial_output: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            snapshot_path: default_snapshot_path(),
            job_history: default_job_history(),
        }
    }
}

impl GeneratorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

impl StorageSettings {
    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.work_dir.join("outputs")
    }
}

impl ServiceConfig {
    /// Parse a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the configuration used by the server binary.
    ///
    /// Uses `TIMETABLE_CONFIG` when set, otherwise the first `timetable.toml`
    /// found in the current directory, `backend/` or the parent directory,
    /// otherwise the defaults. Environment overrides are applied last and
    /// relative paths are made absolute.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("TIMETABLE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => match Self::default_location() {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides()?;
        config.resolve_paths()?;
        config.validate()?;
        Ok(config)
    }

    fn default_location() -> Option<PathBuf> {
        [
            PathBuf::from("timetable.toml"),
            PathBuf::from("backend/timetable.toml"),
            PathBuf::from("../timetable.toml"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    /// Apply `HOST`, `PORT`, `GENERATOR_*` and `TIMETABLE_*` overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("PORT")? {
            self.server.port = port;
        }
        if let Ok(program) = env::var("GENERATOR_PROGRAM") {
            self.generator.program = program;
        }
        if let Some(secs) = parse_env("GENERATOR_TIMEOUT_SECS")? {
            self.generator.timeout_secs = secs;
        }
        if let Some(n) = parse_env("GENERATOR_MAX_CONCURRENT")? {
            self.generator.max_concurrent = n;
        }
        if let Ok(dir) = env::var("TIMETABLE_WORK_DIR") {
            self.storage.work_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("TIMETABLE_SNAPSHOT_PATH") {
            self.storage.snapshot_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Make every configured path absolute against the current directory.
    ///
    /// The generator may run in another directory, so it must only ever see
    /// absolute paths.
    pub fn resolve_paths(&mut self) -> Result<(), ConfigError> {
        let absolute = |key: &str, path: &Path| {
            std::path::absolute(path).map_err(|e| ConfigError::invalid(key, e.to_string()))
        };
        self.generator.working_dir = absolute("generator.working_dir", &self.generator.working_dir)?;
        self.storage.work_dir = absolute("storage.work_dir", &self.storage.work_dir)?;
        self.storage.snapshot_path = absolute("storage.snapshot_path", &self.storage.snapshot_path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator.program.trim().is_empty() {
            return Err(ConfigError::invalid("generator.program", "must not be empty"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::invalid("generator.timeout_secs", "must be positive"));
        }
        if self.generator.max_concurrent == 0 {
            return Err(ConfigError::invalid("generator.max_concurrent", "must be positive"));
        }
        if self.server.body_limit_mb == 0 {
            return Err(ConfigError::invalid("server.body_limit_mb", "must be positive"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{}'", raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.generator.program, "python");
        assert_eq!(config.generator.args, vec!["timetablegenerator.py"]);
        assert_eq!(config.generator.max_concurrent, 4);
        assert!(!config.generator.accept_partial_output);
        assert_eq!(
            config.storage.snapshot_path,
            PathBuf::from("latest_timetables.xlsx")
        );
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_mb = 10

[generator]
program = "/usr/local/bin/scheduler"
args = []
working_dir = "/opt/scheduler"
timeout_secs = 60
max_concurrent = 2
queue_timeout_secs = 5
accept_partial_output = true

[storage]
work_dir = "/var/lib/timetable"
snapshot_path = "/var/lib/timetable/latest.xlsx"
job_history = 10
"#;

        let config: ServiceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8081);
        assert!(config.generator.args.is_empty());
        assert_eq!(config.generator.timeout(), Duration::from_secs(60));
        assert_eq!(config.generator.queue_timeout(), Duration::from_secs(5));
        assert!(config.generator.accept_partial_output);
        assert_eq!(
            config.storage.uploads_dir(),
            PathBuf::from("/var/lib/timetable/uploads")
        );
        assert_eq!(
            config.storage.outputs_dir(),
            PathBuf::from("/var/lib/timetable/outputs")
        );
        assert_eq!(config.storage.job_history, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config: ServiceConfig = toml::from_str("[generator]\nmax_concurrent = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref key, .. }) if key == "generator.max_concurrent"
        ));
    }

    #[test]
    fn test_resolve_paths_makes_paths_absolute() {
        let mut config = ServiceConfig::default();
        config.resolve_paths().unwrap();
        assert!(config.generator.working_dir.is_absolute());
        assert!(config.storage.work_dir.is_absolute());
        assert!(config.storage.snapshot_path.is_absolute());
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let result = ServiceConfig::from_file("/nonexistent/timetable.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
