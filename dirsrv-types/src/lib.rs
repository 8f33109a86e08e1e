//! Core directory data types for dirsrv.
//!
//! This crate defines the plugin-agnostic types every other crate works with:
//! - Distinguished names and search scopes
//! - Attribute types, their syntaxes and value normalization
//! - Entries and modifications
//! - RFC 4515 search filters
//! - LDAP result codes
//!
//! Storage, schema management and the wire protocol live elsewhere; these
//! types only carry data and the matching rules needed to compare it.

mod attribute;
mod dn;
mod entry;
mod filter;
mod result;

pub use attribute::{split_optional_uid, Attribute, AttributeType, Syntax};
pub use dn::{Ava, Dn, DnError, Rdn, SearchScope};
pub use entry::{Entry, Modification, ModificationKind};
pub use filter::{FilterError, SearchFilter};
pub use result::ResultCode;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or mutating directory data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid DN: {0}")]
    Dn(#[from] DnError),

    #[error("invalid search filter: {0}")]
    Filter(#[from] FilterError),

    #[error("attribute '{attribute}' already contains value '{value}'")]
    ValueExists { attribute: String, value: String },

    #[error("attribute '{attribute}' does not contain value '{value}'")]
    NoSuchValue { attribute: String, value: String },

    #[error("entry has no attribute '{0}'")]
    NoSuchAttribute(String),
}

impl Error {
    /// Maps the error onto the LDAP result code a client would see.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::Dn(_) => ResultCode::InvalidDnSyntax,
            Self::Filter(_) => ResultCode::ProtocolError,
            Self::ValueExists { .. } => ResultCode::AttributeOrValueExists,
            Self::NoSuchValue { .. } | Self::NoSuchAttribute(_) => ResultCode::NoSuchAttribute,
        }
    }
}
