//! Minimal attribute-type table.
//!
//! Only names, OIDs and syntaxes are tracked: enough to pick a matching rule
//! for a value and to tell DN-valued attributes apart from the rest.

use dirsrv_types::{AttributeType, Syntax};
use std::collections::HashMap;

/// Attribute types known to the server, keyed by lower-cased name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: HashMap<String, AttributeType>,
}

const STANDARD_TYPES: &[(&str, &str, Syntax)] = &[
    ("objectClass", "2.5.4.0", Syntax::Oid),
    ("cn", "2.5.4.3", Syntax::DirectoryString),
    ("sn", "2.5.4.4", Syntax::DirectoryString),
    ("c", "2.5.4.6", Syntax::DirectoryString),
    ("l", "2.5.4.7", Syntax::DirectoryString),
    ("o", "2.5.4.10", Syntax::DirectoryString),
    ("ou", "2.5.4.11", Syntax::DirectoryString),
    ("title", "2.5.4.12", Syntax::DirectoryString),
    ("description", "2.5.4.13", Syntax::DirectoryString),
    ("telephoneNumber", "2.5.4.20", Syntax::TelephoneNumber),
    ("member", "2.5.4.31", Syntax::DistinguishedName),
    ("owner", "2.5.4.32", Syntax::DistinguishedName),
    ("roleOccupant", "2.5.4.33", Syntax::DistinguishedName),
    ("seeAlso", "2.5.4.34", Syntax::DistinguishedName),
    ("givenName", "2.5.4.42", Syntax::DirectoryString),
    ("uniqueMember", "2.5.4.50", Syntax::NameAndOptionalUid),
    ("uid", "0.9.2342.19200300.100.1.1", Syntax::DirectoryString),
    ("mail", "0.9.2342.19200300.100.1.3", Syntax::Ia5String),
    ("manager", "0.9.2342.19200300.100.1.10", Syntax::DistinguishedName),
    ("secretary", "0.9.2342.19200300.100.1.21", Syntax::DistinguishedName),
    ("dc", "0.9.2342.19200300.100.1.25", Syntax::Ia5String),
    ("employeeNumber", "2.16.840.1.113730.3.1.3", Syntax::DirectoryString),
    ("createTimestamp", "2.5.18.1", Syntax::GeneralizedTime),
    ("modifyTimestamp", "2.5.18.2", Syntax::GeneralizedTime),
];

impl Schema {
    /// An empty table: every lookup falls back to an undefined type.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard user attribute types from RFC 4519 and RFC 4524.
    pub fn standard() -> Self {
        let mut schema = Self::new();
        for (name, oid, syntax) in STANDARD_TYPES {
            schema.register(AttributeType::new(*name, *oid, *syntax));
        }
        schema
    }

    /// Adds or replaces a type definition.
    pub fn register(&mut self, attr_type: AttributeType) {
        self.types.insert(attr_type.normalized_name(), attr_type);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeType> {
        self.types.get(&name.to_ascii_lowercase())
    }

    /// Looks a type up by name, falling back to a directory-string
    /// placeholder for unknown names.
    pub fn get_or_undefined(&self, name: &str) -> AttributeType {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| AttributeType::undefined(name))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
