//! Attribute types, syntaxes and multi-valued attributes.

use crate::dn::{normalize_case_ignore, Dn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The subset of LDAP attribute syntaxes the server reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Syntax {
    DistinguishedName,
    NameAndOptionalUid,
    DirectoryString,
    Ia5String,
    Integer,
    Boolean,
    OctetString,
    Oid,
    GeneralizedTime,
    TelephoneNumber,
}

impl Syntax {
    /// The syntax OID from RFC 4517.
    pub fn oid(&self) -> &'static str {
        match self {
            Self::DistinguishedName => "1.3.6.1.4.1.1466.115.121.1.12",
            Self::NameAndOptionalUid => "1.3.6.1.4.1.1466.115.121.1.34",
            Self::DirectoryString => "1.3.6.1.4.1.1466.115.121.1.15",
            Self::Ia5String => "1.3.6.1.4.1.1466.115.121.1.26",
            Self::Integer => "1.3.6.1.4.1.1466.115.121.1.27",
            Self::Boolean => "1.3.6.1.4.1.1466.115.121.1.7",
            Self::OctetString => "1.3.6.1.4.1.1466.115.121.1.40",
            Self::Oid => "1.3.6.1.4.1.1466.115.121.1.38",
            Self::GeneralizedTime => "1.3.6.1.4.1.1466.115.121.1.24",
            Self::TelephoneNumber => "1.3.6.1.4.1.1466.115.121.1.50",
        }
    }

    /// Human-readable syntax name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DistinguishedName => "DN",
            Self::NameAndOptionalUid => "Name and Optional UID",
            Self::DirectoryString => "Directory String",
            Self::Ia5String => "IA5 String",
            Self::Integer => "INTEGER",
            Self::Boolean => "Boolean",
            Self::OctetString => "Octet String",
            Self::Oid => "OID",
            Self::GeneralizedTime => "Generalized Time",
            Self::TelephoneNumber => "Telephone Number",
        }
    }

    /// True for syntaxes whose values name another entry.
    pub fn is_dn_valued(&self) -> bool {
        matches!(self, Self::DistinguishedName | Self::NameAndOptionalUid)
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Splits a name-and-optional-UID value (`<dn>#'0101'B`) into its DN part and
/// optional bit-string UID.
pub fn split_optional_uid(value: &str) -> (&str, Option<&str>) {
    let trimmed = value.trim_end();
    if trimmed.ends_with("'B") {
        if let Some(pos) = trimmed.rfind("#'") {
            let uid = &trimmed[pos + 1..];
            if uid.len() > 3 && uid[1..uid.len() - 2].chars().all(|c| c == '0' || c == '1') {
                return (&trimmed[..pos], Some(uid));
            }
        }
    }
    (value, None)
}

// ================================================================
// Attribute type
// ================================================================

/// An attribute type definition: primary name, OID and syntax.
///
/// Two attribute types are equal when their names match case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeType {
    name: String,
    oid: String,
    syntax: Syntax,
}

impl AttributeType {
    pub fn new(name: impl Into<String>, oid: impl Into<String>, syntax: Syntax) -> Self {
        Self {
            name: name.into(),
            oid: oid.into(),
            syntax,
        }
    }

    /// Placeholder type for attributes the schema does not define.
    pub fn undefined(name: &str) -> Self {
        Self::new(name, format!("{}-oid", name.to_ascii_lowercase()), Syntax::DirectoryString)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Normalizes a value with this type's equality matching rule.
    pub fn normalize_value(&self, value: &str) -> String {
        match self.syntax {
            Syntax::DistinguishedName => match Dn::parse(value) {
                Ok(dn) => dn.to_normalized_string(),
                Err(_) => normalize_case_ignore(value),
            },
            Syntax::NameAndOptionalUid => {
                let (dn_part, uid) = split_optional_uid(value);
                let dn = match Dn::parse(dn_part) {
                    Ok(dn) => dn.to_normalized_string(),
                    Err(_) => normalize_case_ignore(dn_part),
                };
                match uid {
                    Some(uid) => format!("{dn}#{uid}"),
                    None => dn,
                }
            }
            Syntax::Integer => value.trim().trim_start_matches('+').to_string(),
            Syntax::Boolean => value.trim().to_ascii_uppercase(),
            Syntax::OctetString => value.to_string(),
            Syntax::TelephoneNumber => value
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect(),
            _ => normalize_case_ignore(value),
        }
    }

    /// Whether two values are equal under this type's matching rule.
    pub fn values_match(&self, a: &str, b: &str) -> bool {
        self.normalize_value(a) == self.normalize_value(b)
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for AttributeType {}

impl Hash for AttributeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ================================================================
// Attribute
// ================================================================

/// A multi-valued attribute. Values are kept in insertion order and are
/// unique under the type's matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    attr_type: AttributeType,
    values: Vec<String>,
}

impl Attribute {
    pub fn new<I, S>(attr_type: AttributeType, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attribute = Self {
            attr_type,
            values: Vec::new(),
        };
        for value in values {
            attribute.add(value);
        }
        attribute
    }

    /// An attribute with no values; in a Delete modification it removes the
    /// whole attribute.
    pub fn empty(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            values: Vec::new(),
        }
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.attr_type
    }

    pub fn name(&self) -> &str {
        self.attr_type.name()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        let wanted = self.attr_type.normalize_value(value);
        self.values
            .iter()
            .any(|v| self.attr_type.normalize_value(v) == wanted)
    }

    /// Adds a value. Returns `false` when an equal value was already present.
    pub fn add(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    /// Removes a value. Returns `false` when no equal value was present.
    pub fn remove(&mut self, value: &str) -> bool {
        let wanted = self.attr_type.normalize_value(value);
        let before = self.values.len();
        let attr_type = &self.attr_type;
        self.values
            .retain(|v| attr_type.normalize_value(v) != wanted);
        self.values.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> AttributeType {
        AttributeType::new("member", "2.5.4.31", Syntax::DistinguishedName)
    }

    #[test]
    fn dn_values_match_by_normalized_dn() {
        let t = member();
        assert!(t.values_match("CN=Boss, DC=Example,DC=com", "cn=boss,dc=example,dc=com"));
        assert!(!t.values_match("cn=boss,dc=example,dc=com", "cn=other,dc=example,dc=com"));
    }

    #[test]
    fn attribute_values_are_unique() {
        let mut attr = Attribute::new(member(), ["cn=a,o=test"]);
        assert!(!attr.add("CN=A,O=TEST"));
        assert!(attr.add("cn=b,o=test"));
        assert_eq!(attr.len(), 2);
        assert!(attr.remove("cn=A,o=test"));
        assert!(!attr.remove("cn=A,o=test"));
        assert_eq!(attr.values(), &["cn=b,o=test".to_string()]);
    }

    #[test]
    fn optional_uid_split() {
        assert_eq!(
            split_optional_uid("cn=a,o=test#'0101'B"),
            ("cn=a,o=test", Some("'0101'B"))
        );
        assert_eq!(split_optional_uid("cn=a,o=test"), ("cn=a,o=test", None));
        assert_eq!(split_optional_uid("cn=a#'xy'B"), ("cn=a#'xy'B", None));
    }

    #[test]
    fn empty_bit_string_is_not_a_uid() {
        assert_eq!(split_optional_uid("cn=a,o=test#''B"), ("cn=a,o=test#''B", None));
        assert_eq!(split_optional_uid("cn=a,o=test#'1'B"), ("cn=a,o=test", Some("'1'B")));
    }

    #[test]
    fn unique_member_normalization_keeps_uid() {
        let t = AttributeType::new("uniqueMember", "2.5.4.50", Syntax::NameAndOptionalUid);
        assert_eq!(t.normalize_value("CN=A,O=Test#'01'B"), "cn=a,o=test#'01'B");
    }

    #[test]
    fn type_equality_is_case_insensitive() {
        let a = AttributeType::new("seeAlso", "2.5.4.34", Syntax::DistinguishedName);
        let b = AttributeType::undefined("seealso");
        assert_eq!(a, b);
    }

    #[test]
    fn syntax_classification() {
        assert!(Syntax::DistinguishedName.is_dn_valued());
        assert!(Syntax::NameAndOptionalUid.is_dn_valued());
        assert!(!Syntax::DirectoryString.is_dn_valued());
        assert_eq!(Syntax::DistinguishedName.oid(), "1.3.6.1.4.1.1466.115.121.1.12");
    }
}
