//! Referential integrity plugin for dirsrv.
//!
//! Keeps DN-valued attributes (`member`, `manager`, `uniqueMember`, ...)
//! consistent with the entries they point at:
//!
//! - Add and Modify requests introducing references to missing entries, or
//!   to entries outside the allowed scope or filter, are rejected.
//! - When a referenced entry is deleted or renamed, stale values are removed
//!   or rewritten, either before the operation returns (update interval 0) or
//!   by a background thread that replays a persistent log.

mod changelog;
mod checks;
mod config;
mod error;
mod plugin;
mod repair;
mod worker;

pub use changelog::{ChangeBatch, ChangeLog, DeferredChangeRecord};
pub use checks::{check_add, check_modify};
pub use config::{
    parse_filter_criterion, ReferentialIntegrityConfig, ReferentialIntegrityPluginCfg,
    ScopeCriteria, DEFAULT_LOG_FILE, SUPPORTED_PLUGIN_TYPES,
};
pub use error::{ReferintError, ReferintResult};
pub use plugin::{ReferentialIntegrityPlugin, PLUGIN_NAME};
pub use repair::{reference_filter, repair_all, repair_references, RepairSummary};
pub use worker::{BackgroundWorker, WORKER_THREAD_NAME};
