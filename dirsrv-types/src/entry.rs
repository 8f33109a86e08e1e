//! Directory entries and the modifications applied to them.

use crate::attribute::{Attribute, AttributeType};
use crate::dn::Dn;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A directory entry: a DN and its attributes keyed by lower-cased type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<String, Attribute>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    pub fn attribute(&self, attr_type: &AttributeType) -> Option<&Attribute> {
        self.attributes.get(&attr_type.normalized_name())
    }

    pub fn attribute_by_name(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(&name.to_ascii_lowercase())
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn has_attribute(&self, attr_type: &AttributeType) -> bool {
        self.attribute(attr_type).is_some()
    }

    pub fn has_value(&self, attr_type: &AttributeType, value: &str) -> bool {
        self.attribute(attr_type)
            .is_some_and(|attr| attr.contains(value))
    }

    /// Adds values, merging with any existing attribute of the same type.
    pub fn add_values<I, S>(&mut self, attr_type: &AttributeType, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attr = self
            .attributes
            .entry(attr_type.normalized_name())
            .or_insert_with(|| Attribute::empty(attr_type.clone()));
        for value in values {
            attr.add(value);
        }
        if attr.is_empty() {
            self.attributes.remove(&attr_type.normalized_name());
        }
    }

    /// Replaces the attribute wholesale; an empty attribute removes it.
    pub fn put_attribute(&mut self, attribute: Attribute) {
        let key = attribute.attribute_type().normalized_name();
        if attribute.is_empty() {
            self.attributes.remove(&key);
        } else {
            self.attributes.insert(key, attribute);
        }
    }

    pub fn remove_attribute(&mut self, attr_type: &AttributeType) -> Option<Attribute> {
        self.attributes.remove(&attr_type.normalized_name())
    }

    /// Removes one value. Returns `false` if it was not present.
    pub fn remove_value(&mut self, attr_type: &AttributeType, value: &str) -> bool {
        let key = attr_type.normalized_name();
        let Some(attr) = self.attributes.get_mut(&key) else {
            return false;
        };
        let removed = attr.remove(value);
        if attr.is_empty() {
            self.attributes.remove(&key);
        }
        removed
    }

    /// Applies one modification.
    ///
    /// In permissive mode adding a present value or deleting an absent one is
    /// a no-op instead of an error, which makes reference repair idempotent.
    pub fn apply(&mut self, modification: &Modification, permissive: bool) -> Result<()> {
        let attribute = &modification.attribute;
        let attr_type = attribute.attribute_type();

        match modification.kind {
            ModificationKind::Add => {
                for value in attribute.values() {
                    if self.has_value(attr_type, value) {
                        if permissive {
                            continue;
                        }
                        return Err(Error::ValueExists {
                            attribute: attr_type.name().to_string(),
                            value: value.clone(),
                        });
                    }
                    self.add_values(attr_type, [value.as_str()]);
                }
            }
            ModificationKind::Delete => {
                if attribute.is_empty() {
                    if self.remove_attribute(attr_type).is_none() && !permissive {
                        return Err(Error::NoSuchAttribute(attr_type.name().to_string()));
                    }
                    return Ok(());
                }
                for value in attribute.values() {
                    if !self.remove_value(attr_type, value) && !permissive {
                        return Err(Error::NoSuchValue {
                            attribute: attr_type.name().to_string(),
                            value: value.clone(),
                        });
                    }
                }
            }
            ModificationKind::Replace => self.put_attribute(attribute.clone()),
        }
        Ok(())
    }

    /// Applies a batch of modifications atomically: on error the entry is
    /// left untouched.
    pub fn apply_all(&mut self, modifications: &[Modification], permissive: bool) -> Result<()> {
        let mut working = self.clone();
        for modification in modifications {
            working.apply(modification, permissive)?;
        }
        *self = working;
        Ok(())
    }
}

/// Kind of change a [`Modification`] makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Add,
    Delete,
    Replace,
}

/// One `(kind, attribute, values)` change inside a Modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub kind: ModificationKind,
    pub attribute: Attribute,
}

impl Modification {
    pub fn new(kind: ModificationKind, attribute: Attribute) -> Self {
        Self { kind, attribute }
    }

    pub fn add(attribute: Attribute) -> Self {
        Self::new(ModificationKind::Add, attribute)
    }

    pub fn delete(attribute: Attribute) -> Self {
        Self::new(ModificationKind::Delete, attribute)
    }

    pub fn replace(attribute: Attribute) -> Self {
        Self::new(ModificationKind::Replace, attribute)
    }
}
