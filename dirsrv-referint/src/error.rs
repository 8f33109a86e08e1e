//! Error types for the referential integrity plugin.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for referential integrity operations.
pub type ReferintResult<T> = Result<T, ReferintError>;

#[derive(Debug, Error)]
pub enum ReferintError {
    /// The configuration failed validation. Each reason is operator-facing.
    #[error("unacceptable configuration: {}", .0.join("; "))]
    Configuration(Vec<String>),

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Reading or writing the deferred-change log failed.
    #[error("log file {path}: {source}")]
    LogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A log line could not be decoded as a change record.
    #[error("cannot decode log record '{line}': {reason}")]
    Decode { line: String, reason: String },

    /// The background thread could not be started.
    #[error("failed to start background processing: {0}")]
    Worker(String),

    #[error(transparent)]
    Plugin(#[from] dirsrv_plugin::PluginError),
}

impl ReferintError {
    pub(crate) fn log_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LogIo {
            path: path.into(),
            source,
        }
    }
}
