//! A single suffix-owning in-memory backend.

use crate::error::{DirectoryError, DirectoryResult};
use dirsrv_types::{Dn, Entry, Modification, SearchFilter, SearchScope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Identifies a backend, e.g. `userRoot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BackendId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Entries stored in hierarchical DN order, so every subtree is a contiguous
/// range starting at its base.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    id: BackendId,
    suffixes: Vec<Dn>,
    private: bool,
    equality_indexes: HashSet<String>,
    entries: BTreeMap<Dn, Entry>,
}

impl MemoryBackend {
    /// Creates an empty public backend for `suffixes`.
    pub fn new(id: impl Into<BackendId>, suffixes: Vec<Dn>) -> Self {
        Self {
            id: id.into(),
            suffixes,
            private: false,
            equality_indexes: HashSet::new(),
            entries: BTreeMap::new(),
        }
    }

    /// Declares an equality index on the attribute.
    #[must_use]
    pub fn with_equality_index(mut self, attribute: &str) -> Self {
        self.equality_indexes.insert(attribute.to_ascii_lowercase());
        self
    }

    /// Marks the backend as private: its suffixes are not public naming
    /// contexts.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// The backend id.
    pub fn id(&self) -> &BackendId {
        &self.id
    }

    /// The suffixes this backend is authoritative for.
    pub fn suffixes(&self) -> &[Dn] {
        &self.suffixes
    }

    /// Private backends are not public naming contexts.
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Returns true if `attribute` has an equality index in this backend.
    pub fn is_equality_indexed(&self, attribute: &str) -> bool {
        self.equality_indexes
            .contains(&attribute.to_ascii_lowercase())
    }

    /// The longest suffix of this backend that holds `dn`.
    pub fn suffix_for(&self, dn: &Dn) -> Option<&Dn> {
        self.suffixes
            .iter()
            .filter(|suffix| dn.is_descendant_of(suffix))
            .max_by_key(|suffix| suffix.len())
    }

    /// Returns true if `dn` is at or below one of the suffixes.
    pub fn handles(&self, dn: &Dn) -> bool {
        self.suffix_for(dn).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry stored at `dn`.
    pub fn get(&self, dn: &Dn) -> Option<&Entry> {
        self.entries.get(dn)
    }

    pub fn contains(&self, dn: &Dn) -> bool {
        self.entries.contains_key(dn)
    }

    /// DNs of every entry strictly below `dn`, parents before children.
    pub fn subordinates(&self, dn: &Dn) -> Vec<Dn> {
        self.entries
            .range(dn.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.is_descendant_of(dn))
            .filter(|k| *k != dn)
            .cloned()
            .collect()
    }

    /// Returns true if `dn` has at least one child entry.
    pub fn has_subordinates(&self, dn: &Dn) -> bool {
        self.entries
            .range(dn.clone()..)
            .map(|(k, _)| k)
            .find(|k| *k != dn)
            .is_some_and(|k| k.is_strict_descendant_of(dn))
    }

    // ================================================================
    // Writes
    // ================================================================

    /// Adds an entry. Its parent must exist unless it is a suffix entry.
    pub fn add(&mut self, entry: Entry) -> DirectoryResult<()> {
        let dn = entry.dn().clone();
        if self.entries.contains_key(&dn) {
            return Err(DirectoryError::EntryAlreadyExists(dn));
        }
        if !self.suffixes.contains(&dn) {
            let parent_exists = dn
                .parent()
                .is_some_and(|parent| self.entries.contains_key(&parent));
            if !parent_exists {
                return Err(DirectoryError::NoSuchParent(dn));
            }
        }
        self.entries.insert(dn, entry);
        Ok(())
    }

    /// Applies modifications atomically.
    ///
    /// Strict mode rejects adding a present value, deleting an absent one,
    /// and removing an RDN value. Permissive mode only skips the first two.
    pub fn modify(
        &mut self,
        dn: &Dn,
        modifications: &[Modification],
        permissive: bool,
    ) -> DirectoryResult<()> {
        let entry = self
            .entries
            .get_mut(dn)
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.clone()))?;

        let mut updated = entry.clone();
        updated.apply_all(modifications, permissive)?;
        if !permissive && !keeps_rdn_values(&updated) {
            return Err(DirectoryError::NotAllowedOnRdn(dn.clone()));
        }
        *entry = updated;
        Ok(())
    }

    /// Removes `dn`, and with `subtree` every entry below it.
    ///
    /// Returns the removed subordinate DNs, parents before children.
    pub fn delete(&mut self, dn: &Dn, subtree: bool) -> DirectoryResult<Vec<Dn>> {
        if !self.entries.contains_key(dn) {
            return Err(DirectoryError::NoSuchObject(dn.clone()));
        }
        let subordinates = self.subordinates(dn);
        if !subordinates.is_empty() && !subtree {
            return Err(DirectoryError::NotAllowedOnNonLeaf(dn.clone()));
        }
        for sub in &subordinates {
            self.entries.remove(sub);
        }
        self.entries.remove(dn);
        Ok(subordinates)
    }

    /// Moves `old_dn` and its subtree to `new_dn`.
    ///
    /// The target entry's RDN attribute values follow the new RDN; with
    /// `delete_old_rdn` the old RDN values are removed. Returns the
    /// `(old, new)` pairs of the moved subordinates.
    pub fn rename(
        &mut self,
        old_dn: &Dn,
        new_dn: &Dn,
        delete_old_rdn: bool,
        resolve: impl Fn(&str) -> dirsrv_types::AttributeType,
    ) -> DirectoryResult<Vec<(Dn, Dn)>> {
        if !self.entries.contains_key(old_dn) {
            return Err(DirectoryError::NoSuchObject(old_dn.clone()));
        }
        if new_dn != old_dn && self.entries.contains_key(new_dn) {
            return Err(DirectoryError::EntryAlreadyExists(new_dn.clone()));
        }
        if new_dn.is_strict_descendant_of(old_dn) {
            return Err(DirectoryError::UnwillingToPerform(format!(
                "cannot move {old_dn} below itself"
            )));
        }
        if let Some(parent) = new_dn.parent() {
            if !self.suffixes.contains(new_dn) && !self.entries.contains_key(&parent) {
                return Err(DirectoryError::NoSuchParent(new_dn.clone()));
            }
        }

        let moved = self
            .subordinates(old_dn)
            .into_iter()
            .filter_map(|sub| sub.rebase(old_dn, new_dn).map(|new| (sub, new)))
            .collect::<Vec<_>>();

        let Some(mut target) = self.entries.remove(old_dn) else {
            return Err(DirectoryError::NoSuchObject(old_dn.clone()));
        };
        if delete_old_rdn {
            if let Some(rdn) = old_dn.rdn() {
                for ava in rdn.avas() {
                    target.remove_value(&resolve(ava.attribute()), ava.value());
                }
            }
        }
        if let Some(rdn) = new_dn.rdn() {
            for ava in rdn.avas() {
                target.add_values(&resolve(ava.attribute()), [ava.value()]);
            }
        }
        target.set_dn(new_dn.clone());
        self.entries.insert(new_dn.clone(), target);

        for (old, new) in &moved {
            if let Some(mut entry) = self.entries.remove(old) {
                entry.set_dn(new.clone());
                self.entries.insert(new.clone(), entry);
            }
        }
        Ok(moved)
    }

    // ================================================================
    // Reads
    // ================================================================

    /// Returns every entry within `scope` of `base` that matches `filter`.
    pub fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &SearchFilter,
    ) -> DirectoryResult<Vec<Entry>> {
        if !self.entries.contains_key(base) {
            return Err(DirectoryError::NoSuchObject(base.clone()));
        }
        Ok(self
            .entries
            .range(base.clone()..)
            .take_while(|(dn, _)| dn.is_descendant_of(base))
            .filter(|(dn, _)| dn.matches_scope(base, scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

fn keeps_rdn_values(entry: &Entry) -> bool {
    let Some(rdn) = entry.dn().rdn() else {
        return true;
    };
    rdn.avas().iter().all(|ava| {
        entry
            .attribute_by_name(ava.attribute())
            .is_some_and(|attr| attr.contains(ava.value()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_types::{Attribute, AttributeType, Syntax};

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn entry(s: &str) -> Entry {
        let dn = dn(s);
        let mut e = Entry::new(dn.clone());
        if let Some(rdn) = dn.rdn() {
            for ava in rdn.avas() {
                e.add_values(&AttributeType::undefined(ava.attribute()), [ava.value()]);
            }
        }
        e
    }

    fn populated() -> MemoryBackend {
        let mut be = MemoryBackend::new("userRoot", vec![dn("dc=example,dc=com")]);
        for s in [
            "dc=example,dc=com",
            "ou=people,dc=example,dc=com",
            "uid=a,ou=people,dc=example,dc=com",
            "uid=b,ou=people,dc=example,dc=com",
            "ou=groups,dc=example,dc=com",
        ] {
            be.add(entry(s)).unwrap();
        }
        be
    }

    #[test]
    fn add_requires_parent() {
        let mut be = populated();
        let err = be.add(entry("uid=x,ou=missing,dc=example,dc=com")).unwrap_err();
        assert!(matches!(err, DirectoryError::NoSuchParent(_)));
        let err = be.add(entry("uid=a,ou=people,dc=example,dc=com")).unwrap_err();
        assert!(matches!(err, DirectoryError::EntryAlreadyExists(_)));
    }

    #[test]
    fn subordinates_are_contiguous() {
        let be = populated();
        let subs = be.subordinates(&dn("ou=people,dc=example,dc=com"));
        assert_eq!(subs.len(), 2);
        assert!(be.has_subordinates(&dn("ou=people,dc=example,dc=com")));
        assert!(!be.has_subordinates(&dn("ou=groups,dc=example,dc=com")));
        assert_eq!(be.subordinates(&dn("dc=example,dc=com")).len(), 4);
    }

    #[test]
    fn delete_non_leaf_requires_subtree() {
        let mut be = populated();
        let people = dn("ou=people,dc=example,dc=com");
        assert!(matches!(
            be.delete(&people, false),
            Err(DirectoryError::NotAllowedOnNonLeaf(_))
        ));
        let removed = be.delete(&people, true).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(be.len(), 2);
    }

    #[test]
    fn rename_moves_subtree_and_rdn_values() {
        let mut be = populated();
        let old = dn("ou=people,dc=example,dc=com");
        let new = dn("ou=staff,ou=groups,dc=example,dc=com");
        let moved = be
            .rename(&old, &new, true, AttributeType::undefined)
            .unwrap();
        assert_eq!(moved.len(), 2);
        assert!(be.contains(&dn("uid=a,ou=staff,ou=groups,dc=example,dc=com")));
        assert!(!be.contains(&dn("uid=a,ou=people,dc=example,dc=com")));
        let renamed = be.get(&new).unwrap();
        let ou = AttributeType::undefined("ou");
        assert!(renamed.has_value(&ou, "staff"));
        assert!(!renamed.has_value(&ou, "people"));
    }

    #[test]
    fn strict_modify_protects_rdn() {
        let mut be = populated();
        let target = dn("uid=a,ou=people,dc=example,dc=com");
        let mods = [Modification::delete(Attribute::empty(AttributeType::undefined("uid")))];
        assert!(matches!(
            be.modify(&target, &mods, false),
            Err(DirectoryError::NotAllowedOnRdn(_))
        ));
        let manager = AttributeType::new("manager", "0.9.2342.19200300.100.1.10", Syntax::DistinguishedName);
        let mods = [Modification::delete(Attribute::new(manager, ["cn=nobody"]))];
        assert!(be.modify(&target, &mods, true).is_ok());
    }

    #[test]
    fn search_scopes() {
        let be = populated();
        let base = dn("dc=example,dc=com");
        let all = SearchFilter::Present("objectClass".into());
        assert_eq!(be.search(&base, SearchScope::WholeSubtree, &all).unwrap().len(), 5);
        assert_eq!(be.search(&base, SearchScope::SingleLevel, &all).unwrap().len(), 2);
        assert_eq!(be.search(&base, SearchScope::BaseObject, &all).unwrap().len(), 1);
        assert!(matches!(
            be.search(&dn("ou=missing,dc=example,dc=com"), SearchScope::WholeSubtree, &all),
            Err(DirectoryError::NoSuchObject(_))
        ));
    }
}
