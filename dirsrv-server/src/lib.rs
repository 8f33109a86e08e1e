//! Operation processing for dirsrv.
//!
//! [`OperationProcessor`] runs each client request through the plugin
//! pipeline and commits it to the [`dirsrv_backend::Directory`].
//! [`DirectoryServer`] owns the pipeline and the configuration manager and
//! manages the referential integrity plugin's lifecycle.

mod error;
mod processor;
mod server;

pub use error::{ServerError, ServerResult};
pub use processor::{OperationProcessor, OperationResponse};
pub use server::DirectoryServer;
