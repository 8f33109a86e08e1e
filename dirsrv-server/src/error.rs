//! Error types for the server.

use thiserror::Error;

/// Result type for server setup and administration.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Directory(#[from] dirsrv_backend::DirectoryError),

    #[error(transparent)]
    Plugin(#[from] dirsrv_plugin::PluginError),

    #[error(transparent)]
    Referint(#[from] dirsrv_referint::ReferintError),

    #[error("referential integrity is not enabled")]
    ReferintNotEnabled,
}
