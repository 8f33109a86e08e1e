//! Operation plugin pipeline for dirsrv.
//!
//! Every client operation becomes an [`Operation`] and passes through the
//! [`PluginPipeline`] at fixed [`HookPoint`]s:
//!
//! ```text
//! pre-parse -> pre-operation -> subordinate-* (per descendant) -> backend -> post-operation
//! ```
//!
//! Plugins implement only the capability traits they need ([`PreParseHook`],
//! [`PreOperationHook`], [`PostOperationHook`], [`SubordinateHook`]) and are
//! registered for a set of [`PluginType`]s. Configuration changes reach
//! plugins through the [`ConfigManager`].

mod config;
mod error;
mod hook;
mod operation;
mod pipeline;

pub use config::{ConfigChangeListener, ConfigChangeResult, ConfigManager};
pub use error::{PluginError, PluginResult};
pub use hook::{
    DirectoryPlugin, HookPoint, PluginOutcome, PluginType, PostOperationHook, PreOperationHook,
    PreParseHook, SubordinateHook,
};
pub use operation::{
    Operation, OperationId, OperationKind, OperationRequest, SubordinateChanges, SubordinateStep,
};
pub use pipeline::PluginPipeline;
