//! RFC 4515 string search filters.

use crate::dn::normalize_case_ignore;
use crate::entry::Entry;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("empty filter")]
    Empty,

    #[error("unbalanced parentheses at offset {0}")]
    Unbalanced(usize),

    #[error("missing filter type operator in '{0}'")]
    MissingOperator(String),

    #[error("empty attribute description in '{0}'")]
    EmptyAttribute(String),

    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("'{0}' must contain at least one filter component")]
    EmptySet(char),

    #[error("unexpected trailing data '{0}'")]
    TrailingData(String),

    #[error("extensible match filters are not supported")]
    Unsupported,
}

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    And(Vec<SearchFilter>),
    Or(Vec<SearchFilter>),
    Not(Box<SearchFilter>),
    Equality {
        attribute: String,
        value: String,
    },
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        final_: Option<String>,
    },
    GreaterOrEqual {
        attribute: String,
        value: String,
    },
    LessOrEqual {
        attribute: String,
        value: String,
    },
    Present(String),
    Approximate {
        attribute: String,
        value: String,
    },
}

impl SearchFilter {
    /// Parses a filter string. The outer parentheses are optional.
    pub fn parse(s: &str) -> Result<Self, FilterError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FilterError::Empty);
        }
        let owned;
        let input = if trimmed.starts_with('(') {
            trimmed
        } else {
            owned = format!("({trimmed})");
            owned.as_str()
        };

        let mut parser = FilterParser {
            input: input.as_bytes(),
            text: input,
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        if parser.pos != input.len() {
            return Err(FilterError::TrailingData(input[parser.pos..].to_string()));
        }
        Ok(filter)
    }

    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// OR of the given components; a single component is returned as-is.
    pub fn or(mut components: Vec<SearchFilter>) -> Self {
        if components.len() == 1 {
            components.remove(0)
        } else {
            Self::Or(components)
        }
    }

    pub fn and(mut components: Vec<SearchFilter>) -> Self {
        if components.len() == 1 {
            components.remove(0)
        } else {
            Self::And(components)
        }
    }

    /// Evaluates the filter against an entry using each attribute's own
    /// matching rule.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|f| f.matches(entry)),
            Self::Or(parts) => parts.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Present(attribute) => {
                attribute.eq_ignore_ascii_case("objectClass")
                    || entry.attribute_by_name(attribute).is_some()
            }
            Self::Equality { attribute, value } | Self::Approximate { attribute, value } => entry
                .attribute_by_name(attribute)
                .is_some_and(|attr| attr.contains(value)),
            Self::GreaterOrEqual { attribute, value } => {
                ordering_match(entry, attribute, value, |o| o != Ordering::Less)
            }
            Self::LessOrEqual { attribute, value } => {
                ordering_match(entry, attribute, value, |o| o != Ordering::Greater)
            }
            Self::Substring {
                attribute,
                initial,
                any,
                final_,
            } => entry.attribute_by_name(attribute).is_some_and(|attr| {
                attr.values()
                    .iter()
                    .any(|v| substring_match(v, initial.as_deref(), any, final_.as_deref()))
            }),
        }
    }
}

fn ordering_match(
    entry: &Entry,
    attribute: &str,
    assertion: &str,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    let Some(attr) = entry.attribute_by_name(attribute) else {
        return false;
    };
    let attr_type = attr.attribute_type();
    let wanted = attr_type.normalize_value(assertion);
    attr.values().iter().any(|v| {
        let have = attr_type.normalize_value(v);
        let ordering = match (have.parse::<i64>(), wanted.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => have.cmp(&wanted),
        };
        accept(ordering)
    })
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], final_: Option<&str>) -> bool {
    let value = normalize_case_ignore(value);
    let mut rest = value.as_str();

    if let Some(initial) = initial {
        let initial = normalize_case_ignore(initial);
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }

    let final_ = final_.map(normalize_case_ignore);
    if let Some(f) = &final_ {
        if rest.len() < f.len() || !rest.ends_with(f.as_str()) {
            return false;
        }
        rest = &rest[..rest.len() - f.len()];
    }

    for part in any {
        let part = normalize_case_ignore(part);
        match rest.find(part.as_str()) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

impl FromStr for SearchFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(parts) => write_set(f, '&', parts),
            Self::Or(parts) => write_set(f, '|', parts),
            Self::Not(inner) => write!(f, "(!{inner})"),
            Self::Equality { attribute, value } => {
                write!(f, "({attribute}={})", Escaped(value))
            }
            Self::GreaterOrEqual { attribute, value } => {
                write!(f, "({attribute}>={})", Escaped(value))
            }
            Self::LessOrEqual { attribute, value } => {
                write!(f, "({attribute}<={})", Escaped(value))
            }
            Self::Approximate { attribute, value } => {
                write!(f, "({attribute}~={})", Escaped(value))
            }
            Self::Present(attribute) => write!(f, "({attribute}=*)"),
            Self::Substring {
                attribute,
                initial,
                any,
                final_,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    write!(f, "{}", Escaped(initial))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", Escaped(part))?;
                }
                if let Some(final_) = final_ {
                    write!(f, "{}", Escaped(final_))?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_set(f: &mut fmt::Formatter<'_>, op: char, parts: &[SearchFilter]) -> fmt::Result {
    write!(f, "({op}")?;
    for part in parts {
        write!(f, "{part}")?;
    }
    f.write_str(")")
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '*' => f.write_str("\\2a")?,
                '(' => f.write_str("\\28")?,
                ')' => f.write_str("\\29")?,
                '\\' => f.write_str("\\5c")?,
                '\0' => f.write_str("\\00")?,
                c => write!(f, "{c}")?,
            }
        }
        Ok(())
    }
}

// ================================================================
// Parser
// ================================================================

struct FilterParser<'a> {
    input: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl FilterParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), FilterError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(FilterError::Unbalanced(self.pos))
        }
    }

    fn parse_filter(&mut self) -> Result<SearchFilter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                SearchFilter::And(self.parse_set('&')?)
            }
            Some(b'|') => {
                self.pos += 1;
                SearchFilter::Or(self.parse_set('|')?)
            }
            Some(b'!') => {
                self.pos += 1;
                SearchFilter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(FilterError::Unbalanced(self.pos)),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_set(&mut self, op: char) -> Result<Vec<SearchFilter>, FilterError> {
        let mut parts = Vec::new();
        while self.peek() == Some(b'(') {
            parts.push(self.parse_filter()?);
        }
        if parts.is_empty() {
            return Err(FilterError::EmptySet(op));
        }
        Ok(parts)
    }

    fn parse_item(&mut self) -> Result<SearchFilter, FilterError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut end = start;
        while let Some(b) = self.input.get(end) {
            match b {
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                _ => {}
            }
            end += 1;
        }
        if end >= self.input.len() {
            return Err(FilterError::Unbalanced(end));
        }
        let item = &self.text[start..end];
        self.pos = end;

        let Some(eq) = item.find('=') else {
            return Err(FilterError::MissingOperator(item.to_string()));
        };
        let (lhs, raw_value) = (&item[..eq], &item[eq + 1..]);
        let value_offset = start + eq + 1;

        let (attribute, kind) = if let Some(a) = lhs.strip_suffix('>') {
            (a, b'>')
        } else if let Some(a) = lhs.strip_suffix('<') {
            (a, b'<')
        } else if let Some(a) = lhs.strip_suffix('~') {
            (a, b'~')
        } else if lhs.ends_with(':') || lhs.contains(":dn") {
            return Err(FilterError::Unsupported);
        } else {
            (lhs, b'=')
        };
        let attribute = attribute.trim();
        if attribute.is_empty() {
            return Err(FilterError::EmptyAttribute(item.to_string()));
        }
        if attribute.contains(':') {
            return Err(FilterError::Unsupported);
        }
        let attribute = attribute.to_string();

        match kind {
            b'>' => Ok(SearchFilter::GreaterOrEqual {
                attribute,
                value: unescape(raw_value, value_offset)?,
            }),
            b'<' => Ok(SearchFilter::LessOrEqual {
                attribute,
                value: unescape(raw_value, value_offset)?,
            }),
            b'~' => Ok(SearchFilter::Approximate {
                attribute,
                value: unescape(raw_value, value_offset)?,
            }),
            _ if raw_value == "*" => Ok(SearchFilter::Present(attribute)),
            _ if raw_value.contains('*') => {
                let mut pieces = raw_value.split('*').collect::<Vec<_>>();
                let last = pieces.pop().unwrap_or_default();
                let first = if pieces.is_empty() { "" } else { pieces.remove(0) };
                let initial = non_empty(unescape(first, value_offset)?);
                let final_ = non_empty(unescape(last, value_offset)?);
                let any = pieces
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .map(|p| unescape(p, value_offset))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SearchFilter::Substring {
                    attribute,
                    initial,
                    any,
                    final_,
                })
            }
            _ => Ok(SearchFilter::Equality {
                attribute,
                value: unescape(raw_value, value_offset)?,
            }),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Decodes `\XX` hex escapes into raw bytes, then UTF-8.
fn unescape(raw: &str, offset: usize) -> Result<String, FilterError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .ok_or(FilterError::InvalidEscape(offset + i))?;
            let byte =
                u8::from_str_radix(hex, 16).map_err(|_| FilterError::InvalidEscape(offset + i))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| FilterError::InvalidEscape(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeType, Syntax};
    use crate::dn::Dn;

    fn person() -> Entry {
        let mut e = Entry::new(Dn::parse("uid=jdoe,ou=people,dc=example,dc=com").unwrap());
        e.add_values(&AttributeType::undefined("objectClass"), ["top", "person"]);
        e.add_values(&AttributeType::undefined("cn"), ["John Doe"]);
        e.add_values(
            &AttributeType::new("employeeNumber", "2.16.840.1.113730.3.1.3", Syntax::Integer),
            ["42"],
        );
        e
    }

    #[test]
    fn parse_without_outer_parens() {
        let f = SearchFilter::parse("objectclass=person").unwrap();
        assert_eq!(f, SearchFilter::equality("objectclass", "person"));
    }

    #[test]
    fn parse_nested() {
        let f = SearchFilter::parse("(&(objectClass=person)(|(cn=J*)(!(sn=x))))").unwrap();
        let SearchFilter::And(parts) = &f else {
            panic!("expected and");
        };
        assert_eq!(parts.len(), 2);
        assert!(f.matches(&person()));
    }

    #[test]
    fn substring_and_presence() {
        let e = person();
        assert!(SearchFilter::parse("(cn=*doe)").unwrap().matches(&e));
        assert!(SearchFilter::parse("(cn=jo*n*oe)").unwrap().matches(&e));
        assert!(!SearchFilter::parse("(cn=jane*)").unwrap().matches(&e));
        assert!(SearchFilter::parse("(cn=*)").unwrap().matches(&e));
        assert!(!SearchFilter::parse("(mail=*)").unwrap().matches(&e));
    }

    #[test]
    fn ordering_uses_integers_when_possible() {
        let e = person();
        assert!(SearchFilter::parse("(employeeNumber>=9)").unwrap().matches(&e));
        assert!(!SearchFilter::parse("(employeeNumber<=9)").unwrap().matches(&e));
    }

    #[test]
    fn escapes_round_trip_through_display() {
        let f = SearchFilter::parse(r"(cn=a\2ab\29)").unwrap();
        assert_eq!(f, SearchFilter::equality("cn", "a*b)"));
        assert_eq!(f.to_string(), r"(cn=a\2ab\29)");
    }

    #[test]
    fn parse_errors() {
        assert_eq!(SearchFilter::parse(""), Err(FilterError::Empty));
        assert!(matches!(SearchFilter::parse("(cn=a"), Err(FilterError::Unbalanced(_))));
        assert!(matches!(SearchFilter::parse("(cn)"), Err(FilterError::MissingOperator(_))));
        assert!(matches!(SearchFilter::parse("(&)"), Err(FilterError::EmptySet('&'))));
        assert!(matches!(SearchFilter::parse(r"(cn=\zz)"), Err(FilterError::InvalidEscape(_))));
        assert_eq!(
            SearchFilter::parse("(cn:caseExactMatch:=x)"),
            Err(FilterError::Unsupported)
        );
        assert!(matches!(SearchFilter::parse("(cn=a)(sn=b)"), Err(FilterError::TrailingData(_))));
    }

    #[test]
    fn or_of_one_collapses() {
        let f = SearchFilter::or(vec![SearchFilter::equality("manager", "cn=x")]);
        assert_eq!(f.to_string(), "(manager=cn=x)");
    }
}
