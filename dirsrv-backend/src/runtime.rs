//! The server services plugins are allowed to use.
//!
//! Plugins receive an `Arc<dyn DirectoryRuntime>` at initialization instead
//! of reaching for process-wide state. Everything here is internal: reads and
//! writes bypass access control and the plugin pipeline.

use crate::backend::BackendId;
use crate::error::DirectoryResult;
use dirsrv_types::{AttributeType, Dn, Entry, Modification, SearchFilter, SearchScope};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Server services exposed to plugins.
pub trait DirectoryRuntime: Send + Sync {
    /// Suffixes of all public (non-private) backends.
    fn public_naming_contexts(&self) -> Vec<Dn>;

    /// The backend holding `dn`, if any.
    fn backend_for(&self, dn: &Dn) -> Option<BackendId>;

    /// The naming context (backend suffix) that holds `dn`.
    fn naming_context_of(&self, dn: &Dn) -> Option<Dn>;

    /// Whether `backend` maintains an equality index for `attr_type`.
    fn is_equality_indexed(&self, attr_type: &AttributeType, backend: &BackendId) -> bool;

    /// Schema lookup. Unknown names resolve to a directory-string placeholder.
    fn attribute_type(&self, name: &str) -> AttributeType;

    fn get_entry(&self, dn: &Dn) -> Option<Entry>;

    fn entry_exists(&self, dn: &Dn) -> bool {
        self.get_entry(dn).is_some()
    }

    /// Internal search. A missing base is reported as `NoSuchObject`.
    fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &SearchFilter,
    ) -> DirectoryResult<Vec<Entry>>;

    /// Internal modify. Adding a present value or deleting an absent one is
    /// not an error.
    fn modify(&self, dn: &Dn, modifications: &[Modification]) -> DirectoryResult<()>;

    fn register_shutdown_listener(&self, listener: Arc<dyn ShutdownListener>);

    fn deregister_shutdown_listener(&self, name: &str);

    /// Instance root used to resolve relative paths.
    fn server_root(&self) -> &Path;

    /// Resolves `path` against the server root when it is relative.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.server_root().join(path)
        }
    }
}

/// Something that must be told when the server is shutting down.
pub trait ShutdownListener: Send + Sync {
    /// Unique name used for deregistration.
    fn shutdown_listener_name(&self) -> String;

    fn process_server_shutdown(&self, reason: &str);
}

/// Named shutdown listeners, notified in registration order.
#[derive(Default)]
pub struct ShutdownRegistry {
    listeners: Mutex<Vec<Arc<dyn ShutdownListener>>>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener, replacing any previous one with the same name.
    pub fn register(&self, listener: Arc<dyn ShutdownListener>) {
        let name = listener.shutdown_listener_name();
        let mut listeners = self.listeners.lock();
        listeners.retain(|l| l.shutdown_listener_name() != name);
        debug!(listener = %name, "Shutdown listener registered");
        listeners.push(listener);
    }

    pub fn deregister(&self, name: &str) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| l.shutdown_listener_name() != name);
        before != listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifies and removes every listener. The lock is released before
    /// listeners run so they may deregister themselves.
    pub fn notify_all(&self, reason: &str) {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            let name = listener.shutdown_listener_name();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.process_server_shutdown(reason);
            }));
            if outcome.is_err() {
                warn!(listener = %name, "Shutdown listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
