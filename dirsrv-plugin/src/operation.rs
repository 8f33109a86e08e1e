//! Operation contexts: one client request as it travels through the
//! pipeline.

use dirsrv_types::{Dn, Entry, Modification, Rdn, ResultCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an operation (UUIDv7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Creates a new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of operation a hook is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Add,
    Modify,
    Delete,
    ModifyDn,
    SubordinateModifyDn,
    SubordinateDelete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::ModifyDn => "modify-dn",
            Self::SubordinateModifyDn => "subordinate-modify-dn",
            Self::SubordinateDelete => "subordinate-delete",
        };
        f.write_str(name)
    }
}

/// The client request carried by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Add {
        entry: Entry,
    },
    Modify {
        dn: Dn,
        modifications: Vec<Modification>,
    },
    /// With `subtree` set the whole subtree is removed (subtree delete
    /// control); otherwise only leaf entries can be deleted.
    Delete {
        dn: Dn,
        subtree: bool,
    },
    ModifyDn {
        dn: Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
        new_superior: Option<Dn>,
    },
}

impl OperationRequest {
    /// The operation kind this request produces.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Add { .. } => OperationKind::Add,
            Self::Modify { .. } => OperationKind::Modify,
            Self::Delete { .. } => OperationKind::Delete,
            Self::ModifyDn { .. } => OperationKind::ModifyDn,
        }
    }

    /// The entry the request targets.
    pub fn target_dn(&self) -> &Dn {
        match self {
            Self::Add { entry } => entry.dn(),
            Self::Modify { dn, .. } | Self::Delete { dn, .. } | Self::ModifyDn { dn, .. } => dn,
        }
    }

    /// The DN the target will have after a ModifyDN request.
    pub fn new_dn(&self) -> Option<Dn> {
        match self {
            Self::ModifyDn {
                dn,
                new_rdn,
                new_superior,
                ..
            } => {
                let superior = new_superior.clone().or_else(|| dn.parent())?;
                Some(superior.child(new_rdn.clone()))
            }
            _ => None,
        }
    }
}

/// Per-descendant step of a subtree delete or rename, handed to subordinate
/// hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubordinateStep {
    Renamed { old_dn: Dn, new_dn: Dn },
    Deleted { dn: Dn },
}

/// Descendant changes collected by subordinate hooks during one operation.
///
/// Hooks append here so one subtree delete or rename can be handled in a
/// single pass at post-operation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubordinateChanges {
    pub renamed: Vec<(Dn, Dn)>,
    pub deleted: Vec<Dn>,
}

impl SubordinateChanges {
    /// Returns true if no descendant was deleted or renamed.
    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty() && self.deleted.is_empty()
    }

    /// Records a descendant moved by a subtree rename.
    pub fn record_rename(&mut self, old_dn: Dn, new_dn: Dn) {
        self.renamed.push((old_dn, new_dn));
    }

    /// Records a descendant removed by a subtree delete.
    pub fn record_delete(&mut self, dn: Dn) {
        self.deleted.push(dn);
    }
}

/// One operation in flight.
#[derive(Debug, Clone)]
pub struct Operation {
    id: OperationId,
    pub request: OperationRequest,
    /// For Modify: the target entry with the modifications applied, computed
    /// before pre-operation hooks run.
    pub modified_entry: Option<Entry>,
    pub result_code: ResultCode,
    pub message: Option<String>,
    pub disconnect: bool,
    pub subordinate_changes: SubordinateChanges,
    subordinate_step: Option<SubordinateStep>,
}

impl Operation {
    /// Creates an operation for `request` with a `Success` result.
    pub fn new(request: OperationRequest) -> Self {
        Self {
            id: OperationId::new(),
            request,
            modified_entry: None,
            result_code: ResultCode::Success,
            message: None,
            disconnect: false,
            subordinate_changes: SubordinateChanges::default(),
            subordinate_step: None,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    /// The kind of the client request.
    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }

    /// The entry the request targets.
    pub fn target_dn(&self) -> &Dn {
        self.request.target_dn()
    }

    /// Returns true while the result code is `Success`.
    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }

    /// The descendant currently being processed by subordinate hooks.
    pub fn subordinate_step(&self) -> Option<&SubordinateStep> {
        self.subordinate_step.as_ref()
    }

    /// Sets or clears the descendant the subordinate hooks are called for.
    pub fn set_subordinate_step(&mut self, step: Option<SubordinateStep>) {
        self.subordinate_step = step;
    }

    /// Sets the result code and diagnostic message returned to the client.
    pub fn set_result(&mut self, result_code: ResultCode, message: impl Into<String>) {
        self.result_code = result_code;
        self.message = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn new_dn_keeps_parent_without_new_superior() {
        let req = OperationRequest::ModifyDn {
            dn: dn("uid=a,ou=people,o=test"),
            new_rdn: Rdn::new("uid", "b"),
            delete_old_rdn: true,
            new_superior: None,
        };
        assert_eq!(req.new_dn(), Some(dn("uid=b,ou=people,o=test")));
        assert_eq!(req.kind(), OperationKind::ModifyDn);
    }

    #[test]
    fn new_dn_uses_new_superior() {
        let req = OperationRequest::ModifyDn {
            dn: dn("uid=a,ou=people,o=test"),
            new_rdn: Rdn::new("uid", "a"),
            delete_old_rdn: false,
            new_superior: Some(dn("ou=staff,o=test")),
        };
        assert_eq!(req.new_dn(), Some(dn("uid=a,ou=staff,o=test")));
    }

    #[test]
    fn operation_ids_are_unique() {
        let a = OperationId::new();
        let b = OperationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn fresh_operation_is_successful() {
        let op = Operation::new(OperationRequest::Delete {
            dn: dn("uid=a,o=test"),
            subtree: false,
        });
        assert!(op.is_success());
        assert!(op.subordinate_changes.is_empty());
        assert_eq!(op.target_dn(), &dn("uid=a,o=test"));
    }
}
