//! Directory backends for dirsrv.
//!
//! - [`MemoryBackend`]: one suffix-owning store with declared equality indexes
//! - [`Directory`]: the set of backends plus the shared [`Schema`]
//! - [`DirectoryRuntime`]: the narrow view of the server handed to plugins
//!
//! The indexed on-disk storage engine is out of scope; the in-memory store
//! keeps the same contracts (hierarchical add/delete/rename, scoped search,
//! equality index declarations) so plugins can be driven end to end.

mod backend;
mod directory;
mod error;
mod runtime;
mod schema;

pub use backend::{BackendId, MemoryBackend};
pub use directory::Directory;
pub use error::{DirectoryError, DirectoryResult};
pub use runtime::{DirectoryRuntime, ShutdownListener, ShutdownRegistry};
pub use schema::Schema;
