//! LDAP result codes (RFC 4511 §4.1.9).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code carried by every completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultCode {
    #[default]
    Success,
    OperationsError,
    ProtocolError,
    NoSuchAttribute,
    ConstraintViolation,
    AttributeOrValueExists,
    NoSuchObject,
    InvalidDnSyntax,
    UnwillingToPerform,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    Other,
}

impl ResultCode {
    /// Numeric code as sent on the wire.
    pub fn code(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::NoSuchAttribute => 16,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::NoSuchObject => 32,
            Self::InvalidDnSyntax => 34,
            Self::UnwillingToPerform => 53,
            Self::NotAllowedOnNonLeaf => 66,
            Self::NotAllowedOnRdn => 67,
            Self::EntryAlreadyExists => 68,
            Self::Other => 80,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::OperationsError => "Operations Error",
            Self::ProtocolError => "Protocol Error",
            Self::NoSuchAttribute => "No Such Attribute",
            Self::ConstraintViolation => "Constraint Violation",
            Self::AttributeOrValueExists => "Attribute or Value Exists",
            Self::NoSuchObject => "No Such Entry",
            Self::InvalidDnSyntax => "Invalid DN Syntax",
            Self::UnwillingToPerform => "Unwilling to Perform",
            Self::NotAllowedOnNonLeaf => "Not Allowed on Non-Leaf",
            Self::NotAllowedOnRdn => "Not Allowed on RDN",
            Self::EntryAlreadyExists => "Entry Already Exists",
            Self::Other => "Other",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
