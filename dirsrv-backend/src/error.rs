//! Error types for the directory backends.

use dirsrv_types::{Dn, ResultCode};
use thiserror::Error;

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors returned by backend reads and writes.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The target entry (or search base) does not exist.
    #[error("entry {0} does not exist")]
    NoSuchObject(Dn),

    /// An add or rename would overwrite an existing entry.
    #[error("entry {0} already exists")]
    EntryAlreadyExists(Dn),

    /// The parent of a new entry does not exist.
    #[error("parent entry of {0} does not exist")]
    NoSuchParent(Dn),

    /// The entry has subordinates and the request was not a subtree request.
    #[error("entry {0} has subordinate entries")]
    NotAllowedOnNonLeaf(Dn),

    /// A modification would remove a value used in the entry's RDN.
    #[error("modification would remove an RDN value of {0}")]
    NotAllowedOnRdn(Dn),

    /// No backend holds the DN.
    #[error("no backend is configured to handle {0}")]
    NoBackend(Dn),

    /// A backend with the same id or an overlapping suffix is already registered.
    #[error("backend conflict: {0}")]
    BackendConflict(String),

    /// The request is valid but cannot be carried out here.
    #[error("unwilling to perform: {0}")]
    UnwillingToPerform(String),

    /// A modification failed at the data level.
    #[error(transparent)]
    Data(#[from] dirsrv_types::Error),
}

impl DirectoryError {
    /// The LDAP result code a client would see for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::NoSuchObject(_) | Self::NoSuchParent(_) | Self::NoBackend(_) => {
                ResultCode::NoSuchObject
            }
            Self::EntryAlreadyExists(_) => ResultCode::EntryAlreadyExists,
            Self::NotAllowedOnNonLeaf(_) => ResultCode::NotAllowedOnNonLeaf,
            Self::NotAllowedOnRdn(_) => ResultCode::NotAllowedOnRdn,
            Self::BackendConflict(_) => ResultCode::OperationsError,
            Self::UnwillingToPerform(_) => ResultCode::UnwillingToPerform,
            Self::Data(e) => e.result_code(),
        }
    }
}
