//! Logging setup.
//!
//! Two layers share one `EnvFilter`:
//! - a non-blocking file writer under the configured log directory;
//! - a stdout writer for running in a terminal or container.
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tilecutter.log";

/// Default filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("invalid log filter '{0}'")]
    Filter(String),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// When the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
    #[default]
    Daily,
    Never,
}

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "never" => Ok(LogRotation::Never),
            other => Err(format!("unknown log rotation '{other}'")),
        }
    }
}

impl std::fmt::Display for LogRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogRotation::Daily => "daily",
            LogRotation::Never => "never",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            file: DEFAULT_LOG_FILE.to_string(),
            level: DEFAULT_LOG_LEVEL.to_string(),
            rotation: LogRotation::default(),
        }
    }
}

/// Keeps the file writer alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Installs the global subscriber.
///
/// Fails if a subscriber is already installed, so call it once per
/// process.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    fs::create_dir_all(&config.directory).map_err(|source| LoggingError::Directory {
        path: config.directory.clone(),
        source,
    })?;

    let appender = match config.rotation {
        LogRotation::Daily => rolling::daily(&config.directory, &config.file),
        LogRotation::Never => rolling::never(&config.directory, &config.file),
    };
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_timer(LocalTime::new(Rfc3339))
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(false);

    tracing_subscriber::registry()
        .with(build_filter(&config.level)?)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// `RUST_LOG` when set, otherwise `level`.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|_| LoggingError::Filter(level.to_string())),
    }
}

/// `~/.tilecutter/logs`, or `./logs` without a home directory.
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".tilecutter").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.file, "tilecutter.log");
        assert_eq!(config.level, "info");
        assert_eq!(config.rotation, LogRotation::Daily);
        assert!(config.directory.ends_with("logs"));
    }

    #[test]
    fn test_rotation_parse() {
        assert_eq!("Never".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert_eq!(" daily ".parse::<LogRotation>().unwrap(), LogRotation::Daily);
        assert!("hourly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_filter_accepts_directives() {
        assert!(EnvFilter::try_new("tilecutter=debug,info").is_ok());
        assert!(EnvFilter::try_new("[").is_err());
    }

    #[test]
    fn test_unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let config = LoggingConfig {
            directory: blocker.join("logs"),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::Directory { .. })
        ));
    }
}
