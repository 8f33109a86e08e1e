//! Error types for the plugin pipeline and configuration manager.

use crate::hook::PluginType;
use thiserror::Error;

/// Result type for plugin registration and configuration changes.
pub type PluginResult<T> = Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin already registered: {0}")]
    PluginAlreadyRegistered(String),

    #[error("plugin type '{plugin_type}' is not supported by plugin '{plugin}'")]
    UnsupportedPluginType {
        plugin: String,
        plugin_type: PluginType,
    },

    #[error("plugin '{0}' must be registered for at least one plugin type")]
    NoPluginTypes(String),

    #[error("unknown plugin type: {0}")]
    UnknownPluginType(String),

    #[error("configuration '{name}' rejected: {}", reasons.join("; "))]
    ConfigRejected { name: String, reasons: Vec<String> },

    #[error("no configuration registered under '{0}'")]
    ConfigNotFound(String),

    #[error("plugin initialization failed: {0}")]
    InitializationFailed(String),
}
