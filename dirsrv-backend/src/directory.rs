//! The in-memory directory: a set of suffix-owning backends sharing one
//! schema table.

use crate::backend::{BackendId, MemoryBackend};
use crate::error::{DirectoryError, DirectoryResult};
use crate::runtime::{DirectoryRuntime, ShutdownListener, ShutdownRegistry};
use crate::schema::Schema;
use dirsrv_types::{AttributeType, Dn, Entry, Modification, SearchFilter, SearchScope};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Multi-backend directory store.
///
/// Client writes go through the strict methods (`add_entry`, `modify_entry`,
/// `delete_entry`, `rename_entry`). The [`DirectoryRuntime`] impl provides
/// the permissive internal operations plugins use.
pub struct Directory {
    server_root: PathBuf,
    schema: RwLock<Schema>,
    backends: RwLock<Vec<MemoryBackend>>,
    shutdown: ShutdownRegistry,
}

impl Directory {
    /// Creates an empty directory with the standard schema.
    pub fn new(server_root: impl Into<PathBuf>) -> Self {
        Self::with_schema(server_root, Schema::standard())
    }

    pub fn with_schema(server_root: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            server_root: server_root.into(),
            schema: RwLock::new(schema),
            backends: RwLock::new(Vec::new()),
            shutdown: ShutdownRegistry::new(),
        }
    }

    /// Registers a backend. Ids and suffixes must be unique.
    pub fn add_backend(&self, backend: MemoryBackend) -> DirectoryResult<()> {
        let mut backends = self.backends.write();
        for existing in backends.iter() {
            if existing.id() == backend.id() {
                return Err(DirectoryError::BackendConflict(format!(
                    "backend id {} is already in use",
                    backend.id()
                )));
            }
            if let Some(suffix) = backend
                .suffixes()
                .iter()
                .find(|s| existing.suffixes().contains(s))
            {
                return Err(DirectoryError::BackendConflict(format!(
                    "suffix {suffix} is already held by backend {}",
                    existing.id()
                )));
            }
        }
        info!(backend = %backend.id(), suffixes = backend.suffixes().len(), "Backend registered");
        backends.push(backend);
        Ok(())
    }

    pub fn register_attribute_type(&self, attr_type: AttributeType) {
        self.schema.write().register(attr_type);
    }

    /// Index of the backend holding `dn`: the one with the longest matching
    /// suffix.
    fn backend_index(backends: &[MemoryBackend], dn: &Dn) -> Option<usize> {
        backends
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.suffix_for(dn).map(|s| (i, s.len())))
            .max_by_key(|(_, len)| *len)
            .map(|(i, _)| i)
    }

    fn with_backend<T>(
        &self,
        dn: &Dn,
        f: impl FnOnce(&MemoryBackend) -> DirectoryResult<T>,
    ) -> DirectoryResult<T> {
        let backends = self.backends.read();
        let idx = Self::backend_index(&backends, dn)
            .ok_or_else(|| DirectoryError::NoBackend(dn.clone()))?;
        f(&backends[idx])
    }

    fn with_backend_mut<T>(
        &self,
        dn: &Dn,
        f: impl FnOnce(&mut MemoryBackend) -> DirectoryResult<T>,
    ) -> DirectoryResult<T> {
        let mut backends = self.backends.write();
        let idx = Self::backend_index(&backends, dn)
            .ok_or_else(|| DirectoryError::NoBackend(dn.clone()))?;
        f(&mut backends[idx])
    }

    // ================================================================
    // Client operations
    // ================================================================

    pub fn add_entry(&self, entry: Entry) -> DirectoryResult<()> {
        let dn = entry.dn().clone();
        self.with_backend_mut(&dn, |backend| backend.add(entry))?;
        debug!(dn = %dn, "Entry added");
        Ok(())
    }

    pub fn modify_entry(&self, dn: &Dn, modifications: &[Modification]) -> DirectoryResult<()> {
        self.with_backend_mut(dn, |backend| backend.modify(dn, modifications, false))
    }

    /// Deletes `dn` (and with `subtree` its descendants). Returns the removed
    /// descendant DNs.
    pub fn delete_entry(&self, dn: &Dn, subtree: bool) -> DirectoryResult<Vec<Dn>> {
        let removed = self.with_backend_mut(dn, |backend| backend.delete(dn, subtree))?;
        debug!(dn = %dn, subordinates = removed.len(), "Entry deleted");
        Ok(removed)
    }

    /// Moves `old_dn` and its subtree to `new_dn` inside one backend.
    /// Returns the `(old, new)` DN pairs of moved descendants.
    pub fn rename_entry(
        &self,
        old_dn: &Dn,
        new_dn: &Dn,
        delete_old_rdn: bool,
    ) -> DirectoryResult<Vec<(Dn, Dn)>> {
        let schema = self.schema.read().clone();
        let mut backends = self.backends.write();
        let old_idx = Self::backend_index(&backends, old_dn)
            .ok_or_else(|| DirectoryError::NoBackend(old_dn.clone()))?;
        let new_idx = Self::backend_index(&backends, new_dn)
            .ok_or_else(|| DirectoryError::NoBackend(new_dn.clone()))?;
        if old_idx != new_idx {
            return Err(DirectoryError::UnwillingToPerform(format!(
                "cannot move {old_dn} to {new_dn} in a different backend"
            )));
        }
        let moved = backends[old_idx].rename(old_dn, new_dn, delete_old_rdn, |name| {
            schema.get_or_undefined(name)
        })?;
        debug!(old_dn = %old_dn, new_dn = %new_dn, subordinates = moved.len(), "Entry renamed");
        Ok(moved)
    }

    /// DNs of every entry strictly below `dn`, parents before children.
    pub fn subordinates(&self, dn: &Dn) -> DirectoryResult<Vec<Dn>> {
        self.with_backend(dn, |backend| {
            if backend.contains(dn) {
                Ok(backend.subordinates(dn))
            } else {
                Err(DirectoryError::NoSuchObject(dn.clone()))
            }
        })
    }

    pub fn entry(&self, dn: &Dn) -> Option<Entry> {
        self.with_backend(dn, |backend| Ok(backend.get(dn).cloned()))
            .ok()
            .flatten()
    }

    pub fn entry_count(&self) -> usize {
        self.backends.read().iter().map(MemoryBackend::len).sum()
    }

    /// Notifies every shutdown listener.
    pub fn shutdown(&self, reason: &str) {
        info!(reason = %reason, listeners = self.shutdown.len(), "Directory shutting down");
        self.shutdown.notify_all(reason);
    }

    pub fn shutdown_listener_count(&self) -> usize {
        self.shutdown.len()
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("server_root", &self.server_root)
            .field("backends", &self.backends.read().len())
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

impl DirectoryRuntime for Directory {
    fn public_naming_contexts(&self) -> Vec<Dn> {
        self.backends
            .read()
            .iter()
            .filter(|b| !b.is_private())
            .flat_map(|b| b.suffixes().iter().cloned())
            .collect()
    }

    fn backend_for(&self, dn: &Dn) -> Option<BackendId> {
        let backends = self.backends.read();
        Self::backend_index(&backends, dn).map(|i| backends[i].id().clone())
    }

    fn naming_context_of(&self, dn: &Dn) -> Option<Dn> {
        let backends = self.backends.read();
        backends
            .iter()
            .filter_map(|b| b.suffix_for(dn))
            .max_by_key(|s| s.len())
            .cloned()
    }

    fn is_equality_indexed(&self, attr_type: &AttributeType, backend: &BackendId) -> bool {
        self.backends
            .read()
            .iter()
            .find(|b| b.id() == backend)
            .is_some_and(|b| b.is_equality_indexed(attr_type.name()))
    }

    fn attribute_type(&self, name: &str) -> AttributeType {
        self.schema.read().get_or_undefined(name)
    }

    fn get_entry(&self, dn: &Dn) -> Option<Entry> {
        self.entry(dn)
    }

    fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &SearchFilter,
    ) -> DirectoryResult<Vec<Entry>> {
        self.with_backend(base, |backend| backend.search(base, scope, filter))
            .map_err(|e| match e {
                DirectoryError::NoBackend(dn) => DirectoryError::NoSuchObject(dn),
                other => other,
            })
    }

    fn modify(&self, dn: &Dn, modifications: &[Modification]) -> DirectoryResult<()> {
        self.with_backend_mut(dn, |backend| backend.modify(dn, modifications, true))
    }

    fn register_shutdown_listener(&self, listener: Arc<dyn ShutdownListener>) {
        self.shutdown.register(listener);
    }

    fn deregister_shutdown_listener(&self, name: &str) {
        self.shutdown.deregister(name);
    }

    fn server_root(&self) -> &Path {
        &self.server_root
    }
}
