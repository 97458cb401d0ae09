//! Diagnostic logging.
//!
//! The terminal belongs to the live table, so logs only ever go to a file
//! and only when one is asked for. `GCMON_LOG` overrides the level with
//! the usual `EnvFilter` directives.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "GCMON_LOG";
const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Used when `GCMON_LOG` is unset or invalid.
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("failed to open log file {path}")]
    FileCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set global subscriber")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    let level = config.level.as_deref().unwrap_or(DEFAULT_LEVEL);
    EnvFilter::try_new(level).map_err(|err| LogError::InvalidLevel(format!("{level}: {err}")))
}

fn open_log_file(path: &Path) -> Result<fs::File, LogError> {
    let wrap = |source| LogError::FileCreate {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)
}

/// Installs the global subscriber.
///
/// Returns `None` when no log file is configured. Keep the guard alive
/// until exit or buffered lines are lost.
///
/// # Errors
/// Returns an error if the level is invalid, the file cannot be opened or
/// a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LogError> {
    let Some(path) = &config.file else {
        return Ok(None);
    };
    let env_filter = filter(config)?;
    let file = open_log_file(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true),
    );
    tracing::subscriber::set_global_default(subscriber)?;
    tracing::debug!(path = %path.display(), "logging initialized");
    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    #[test]
    fn test_no_file_installs_nothing() {
        let guard = init_logging(&LogConfig::default()).unwrap();
        assert!(guard.is_none());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LogConfig {
            level: Some("gcmon=verbose".to_string()),
            file: None,
        };
        // Only checked when a subscriber would be built.
        if env::var_os(LOG_ENV).is_none() {
            assert!(matches!(filter(&config), Err(LogError::InvalidLevel(_))));
        }
    }

    #[test]
    fn test_log_file_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/gcmon.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
