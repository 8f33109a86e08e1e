//! Distinguished names (RFC 4514).
//!
//! A [`Dn`] keeps both the user-supplied form of every attribute value
//! assertion and its normalized form. Equality, hashing and ordering only
//! look at the normalized form, so `CN=Boss, DC=Example,DC=com` and
//! `cn=boss,dc=example,dc=com` are the same key.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while decoding a DN string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    #[error("RDN component without '=' in '{0}'")]
    MissingEquals(String),

    #[error("empty attribute type in '{0}'")]
    EmptyAttribute(String),

    #[error("illegal character in attribute type '{0}'")]
    InvalidAttribute(String),

    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),

    #[error("unterminated quoted value in '{0}'")]
    UnterminatedQuote(String),

    #[error("value is not valid UTF-8 in '{0}'")]
    InvalidUtf8(String),
}

/// Search scope relative to a base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchScope {
    /// Only the base entry itself.
    BaseObject,
    /// Immediate children of the base.
    SingleLevel,
    /// The base and everything below it.
    WholeSubtree,
    /// Everything below the base, excluding the base.
    SubordinateSubtree,
}

// ================================================================
// Attribute value assertion
// ================================================================

/// One `type=value` pair of an RDN.
#[derive(Debug, Clone)]
pub struct Ava {
    attr: String,
    value: String,
    norm_attr: String,
    norm_value: String,
}

impl Ava {
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        let attr = attr.into();
        let value = value.into();
        let norm_attr = attr.to_ascii_lowercase();
        let norm_value = normalize_case_ignore(&value);
        Self {
            attr,
            value,
            norm_attr,
            norm_value,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attr
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn normalized_attribute(&self) -> &str {
        &self.norm_attr
    }

    pub fn normalized_value(&self) -> &str {
        &self.norm_value
    }

    fn key(&self) -> (&str, &str) {
        (&self.norm_attr, &self.norm_value)
    }
}

impl PartialEq for Ava {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Ava {}

impl Hash for Ava {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Ava {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ava {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

// ================================================================
// Relative distinguished name
// ================================================================

/// A relative distinguished name: one or more AVAs joined by `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Creates a single-valued RDN.
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava::new(attr, value)],
        }
    }

    fn from_avas(mut avas: Vec<Ava>) -> Self {
        avas.sort();
        avas.dedup();
        Self { avas }
    }

    /// Parses a single RDN such as `cn=John Smith+uid=jsmith`.
    pub fn parse(s: &str) -> Result<Self, DnError> {
        let mut rdns = Dn::parse(s)?.rdns;
        if rdns.len() == 1 {
            Ok(rdns.remove(0))
        } else {
            Err(DnError::MissingEquals(s.to_string()))
        }
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    fn write_normalized(&self, out: &mut String) {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            out.push_str(&ava.norm_attr);
            out.push('=');
            escape_value(&ava.norm_value, out);
        }
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            out.push_str(&ava.attr);
            out.push('=');
            escape_value(&ava.value, &mut out);
        }
        f.write_str(&out)
    }
}

// ================================================================
// Distinguished name
// ================================================================

/// A distinguished name. RDNs are stored leaf first, as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The zero-length root DN.
    #[must_use]
    pub const fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Decodes an RFC 4514 string representation.
    pub fn parse(s: &str) -> Result<Self, DnError> {
        DnParser::new(s).parse()
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDN components.
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The leaf RDN, or `None` for the root DN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The immediate superior, or `None` for the root DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Returns the DN of a child entry named by `rdn`.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// True when `self` equals `base` or lies anywhere below it.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        self.rdns.len() >= base.rdns.len() && self.rdns.ends_with(&base.rdns)
    }

    /// True when `self` lies below `base` and is not `base` itself.
    pub fn is_strict_descendant_of(&self, base: &Dn) -> bool {
        self.rdns.len() > base.rdns.len() && self.rdns.ends_with(&base.rdns)
    }

    /// Whether this DN falls inside `scope` relative to `base`.
    pub fn matches_scope(&self, base: &Dn, scope: SearchScope) -> bool {
        match scope {
            SearchScope::BaseObject => self == base,
            SearchScope::SingleLevel => self.parent().as_ref() == Some(base),
            SearchScope::WholeSubtree => self.is_descendant_of(base),
            SearchScope::SubordinateSubtree => self.is_strict_descendant_of(base),
        }
    }

    /// Moves this DN from under `old_base` to under `new_base`.
    ///
    /// Returns `None` when the DN is not at or below `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if !self.is_descendant_of(old_base) {
            return None;
        }
        let keep = self.rdns.len() - old_base.rdns.len();
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend(new_base.rdns.iter().cloned());
        Some(Self { rdns })
    }

    /// The canonical string: lower-cased attribute types, case-folded values
    /// with collapsed whitespace.
    pub fn to_normalized_string(&self) -> String {
        let mut out = String::new();
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            rdn.write_normalized(&mut out);
        }
        out
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = DnError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.to_string()
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Hierarchical order: suffix first, so a parent always sorts before its
/// descendants.
impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.rdns.iter().rev().zip(other.rdns.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.rdns.len().cmp(&other.rdns.len())
    }
}

// ================================================================
// Parsing
// ================================================================

struct DnParser<'a> {
    input: &'a str,
    rdns: Vec<Rdn>,
    avas: Vec<Ava>,
    attr: String,
    value: Vec<u8>,
    protected_len: usize,
    in_value: bool,
}

impl<'a> DnParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            rdns: Vec::new(),
            avas: Vec::new(),
            attr: String::new(),
            value: Vec::new(),
            protected_len: 0,
            in_value: false,
        }
    }

    fn parse(mut self) -> Result<Dn, DnError> {
        if self.input.trim().is_empty() {
            return Ok(Dn::root());
        }

        let mut chars = self.input.chars();
        let mut quoted = false;

        while let Some(c) = chars.next() {
            if !self.in_value {
                match c {
                    '=' => self.in_value = true,
                    ',' | ';' | '+' | '\\' | '"' => {
                        return Err(DnError::MissingEquals(self.input.to_string()));
                    }
                    _ => self.attr.push(c),
                }
                continue;
            }

            if quoted {
                match c {
                    '"' => {
                        quoted = false;
                        self.protected_len = self.value.len();
                    }
                    '\\' => self.read_escape(&mut chars)?,
                    _ => self.push_char(c),
                }
                continue;
            }

            match c {
                '\\' => self.read_escape(&mut chars)?,
                '"' if self.value.is_empty() => quoted = true,
                ',' | ';' => {
                    self.finish_ava()?;
                    self.finish_rdn();
                }
                '+' => self.finish_ava()?,
                ' ' if self.value.is_empty() => {}
                _ => self.push_char(c),
            }
        }

        if quoted {
            return Err(DnError::UnterminatedQuote(self.input.to_string()));
        }
        if !self.in_value {
            return Err(DnError::MissingEquals(self.input.to_string()));
        }
        self.finish_ava()?;
        self.finish_rdn();

        Ok(Dn { rdns: self.rdns })
    }

    fn push_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.value.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    fn read_escape(&mut self, chars: &mut std::str::Chars<'_>) -> Result<(), DnError> {
        let first = chars
            .next()
            .ok_or_else(|| DnError::InvalidEscape(self.input.to_string()))?;
        if first.is_ascii_hexdigit() {
            let second = chars
                .next()
                .filter(char::is_ascii_hexdigit)
                .ok_or_else(|| DnError::InvalidEscape(self.input.to_string()))?;
            let hex: String = [first, second].iter().collect();
            let byte = u8::from_str_radix(&hex, 16)
                .map_err(|_| DnError::InvalidEscape(self.input.to_string()))?;
            self.value.push(byte);
        } else {
            self.push_char(first);
        }
        self.protected_len = self.value.len();
        Ok(())
    }

    fn finish_ava(&mut self) -> Result<(), DnError> {
        if !self.in_value {
            return Err(DnError::MissingEquals(self.input.to_string()));
        }

        let attr = self.attr.trim().to_string();
        if attr.is_empty() {
            return Err(DnError::EmptyAttribute(self.input.to_string()));
        }
        if !attr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(DnError::InvalidAttribute(attr));
        }

        while self.value.len() > self.protected_len && self.value.last() == Some(&b' ') {
            self.value.pop();
        }
        let value = String::from_utf8(std::mem::take(&mut self.value))
            .map_err(|_| DnError::InvalidUtf8(self.input.to_string()))?;

        self.avas.push(Ava::new(attr, value));
        self.attr.clear();
        self.protected_len = 0;
        self.in_value = false;
        Ok(())
    }

    fn finish_rdn(&mut self) {
        let avas = std::mem::take(&mut self.avas);
        self.rdns.push(Rdn::from_avas(avas));
    }
}

/// Case-ignore normalization: trim, collapse internal whitespace, lowercase.
pub(crate) fn normalize_case_ignore(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn escape_value(value: &str, out: &mut String) {
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
}
