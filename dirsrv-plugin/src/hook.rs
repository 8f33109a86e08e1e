//! Plugin hook contracts.
//!
//! A plugin exposes one capability trait per hook point it implements. The
//! pipeline asks the plugin for each capability through [`DirectoryPlugin`]
//! and only calls the ones that are present.

use crate::error::PluginError;
use crate::operation::{Operation, OperationKind};
use dirsrv_types::{Dn, ResultCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Points in an operation's life where plugins run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPoint {
    PreParse,
    PreOperation,
    PostOperation,
    SubordinateModifyDn,
    SubordinateDelete,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreParse => "pre-parse",
            Self::PreOperation => "pre-operation",
            Self::PostOperation => "post-operation",
            Self::SubordinateModifyDn => "subordinate-modify-dn",
            Self::SubordinateDelete => "subordinate-delete",
        };
        f.write_str(name)
    }
}

/// A hook point bound to one operation kind, e.g. `preoperationadd`.
///
/// Plugins are registered for a set of plugin types; the names match the
/// values of the `plugin-type` configuration attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    PreParseAdd,
    PreParseModify,
    PreParseDelete,
    PreParseModifyDn,
    PreOperationAdd,
    PreOperationModify,
    PreOperationDelete,
    PreOperationModifyDn,
    PostOperationAdd,
    PostOperationModify,
    PostOperationDelete,
    PostOperationModifyDn,
    SubordinateModifyDn,
    SubordinateDelete,
}

impl PluginType {
    pub const ALL: [PluginType; 14] = [
        Self::PreParseAdd,
        Self::PreParseModify,
        Self::PreParseDelete,
        Self::PreParseModifyDn,
        Self::PreOperationAdd,
        Self::PreOperationModify,
        Self::PreOperationDelete,
        Self::PreOperationModifyDn,
        Self::PostOperationAdd,
        Self::PostOperationModify,
        Self::PostOperationDelete,
        Self::PostOperationModifyDn,
        Self::SubordinateModifyDn,
        Self::SubordinateDelete,
    ];

    pub fn hook_point(&self) -> HookPoint {
        match self {
            Self::PreParseAdd | Self::PreParseModify | Self::PreParseDelete | Self::PreParseModifyDn => {
                HookPoint::PreParse
            }
            Self::PreOperationAdd
            | Self::PreOperationModify
            | Self::PreOperationDelete
            | Self::PreOperationModifyDn => HookPoint::PreOperation,
            Self::PostOperationAdd
            | Self::PostOperationModify
            | Self::PostOperationDelete
            | Self::PostOperationModifyDn => HookPoint::PostOperation,
            Self::SubordinateModifyDn => HookPoint::SubordinateModifyDn,
            Self::SubordinateDelete => HookPoint::SubordinateDelete,
        }
    }

    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Self::PreParseAdd | Self::PreOperationAdd | Self::PostOperationAdd => OperationKind::Add,
            Self::PreParseModify | Self::PreOperationModify | Self::PostOperationModify => {
                OperationKind::Modify
            }
            Self::PreParseDelete | Self::PreOperationDelete | Self::PostOperationDelete => {
                OperationKind::Delete
            }
            Self::PreParseModifyDn | Self::PreOperationModifyDn | Self::PostOperationModifyDn => {
                OperationKind::ModifyDn
            }
            Self::SubordinateModifyDn => OperationKind::SubordinateModifyDn,
            Self::SubordinateDelete => OperationKind::SubordinateDelete,
        }
    }

    /// The plugin type dispatched at `point` for an operation of `kind`.
    ///
    /// Subordinate hook points ignore the kind: they fire only inside
    /// subtree renames and deletes.
    pub fn for_dispatch(point: HookPoint, kind: OperationKind) -> Option<PluginType> {
        use OperationKind as K;
        let t = match (point, kind) {
            (HookPoint::PreParse, K::Add) => Self::PreParseAdd,
            (HookPoint::PreParse, K::Modify) => Self::PreParseModify,
            (HookPoint::PreParse, K::Delete) => Self::PreParseDelete,
            (HookPoint::PreParse, K::ModifyDn) => Self::PreParseModifyDn,
            (HookPoint::PreOperation, K::Add) => Self::PreOperationAdd,
            (HookPoint::PreOperation, K::Modify) => Self::PreOperationModify,
            (HookPoint::PreOperation, K::Delete) => Self::PreOperationDelete,
            (HookPoint::PreOperation, K::ModifyDn) => Self::PreOperationModifyDn,
            (HookPoint::PostOperation, K::Add) => Self::PostOperationAdd,
            (HookPoint::PostOperation, K::Modify) => Self::PostOperationModify,
            (HookPoint::PostOperation, K::Delete) => Self::PostOperationDelete,
            (HookPoint::PostOperation, K::ModifyDn) => Self::PostOperationModifyDn,
            (HookPoint::SubordinateModifyDn, _) => Self::SubordinateModifyDn,
            (HookPoint::SubordinateDelete, _) => Self::SubordinateDelete,
            _ => return None,
        };
        Some(t)
    }

    /// The configuration name, e.g. `postoperationdelete`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PreParseAdd => "preparseadd",
            Self::PreParseModify => "preparsemodify",
            Self::PreParseDelete => "preparsedelete",
            Self::PreParseModifyDn => "preparsemodifydn",
            Self::PreOperationAdd => "preoperationadd",
            Self::PreOperationModify => "preoperationmodify",
            Self::PreOperationDelete => "preoperationdelete",
            Self::PreOperationModifyDn => "preoperationmodifydn",
            Self::PostOperationAdd => "postoperationadd",
            Self::PostOperationModify => "postoperationmodify",
            Self::PostOperationDelete => "postoperationdelete",
            Self::PostOperationModifyDn => "postoperationmodifydn",
            Self::SubordinateModifyDn => "subordinatemodifydn",
            Self::SubordinateDelete => "subordinatedelete",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PluginType {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| PluginError::UnknownPluginType(s.to_string()))
    }
}

/// What a hook decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutcome {
    /// Proceed with the next plugin and the operation.
    Continue,
    /// Stop processing with this result.
    Stop {
        result_code: ResultCode,
        message: String,
    },
    /// Stop processing and tear down the client connection.
    Disconnect {
        result_code: ResultCode,
        message: String,
    },
}

impl PluginOutcome {
    pub fn stop(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self::Stop {
            result_code,
            message: message.into(),
        }
    }

    pub fn disconnect(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self::Disconnect {
            result_code,
            message: message.into(),
        }
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Records a stopping outcome on the operation. `Continue` is a no-op.
    pub fn apply_to(&self, op: &mut Operation) {
        match self {
            Self::Continue => {}
            Self::Stop {
                result_code,
                message,
            } => op.set_result(*result_code, message.clone()),
            Self::Disconnect {
                result_code,
                message,
            } => {
                op.set_result(*result_code, message.clone());
                op.disconnect = true;
            }
        }
    }
}

// ================================================================
// Capability traits
// ================================================================

/// Runs before the request is decoded into its final form.
pub trait PreParseHook: Send + Sync {
    fn pre_parse(&self, op: &mut Operation) -> PluginOutcome;
}

/// Runs before the backend applies the change; may rewrite the request.
pub trait PreOperationHook: Send + Sync {
    fn pre_operation(&self, op: &mut Operation) -> PluginOutcome;
}

/// Runs after the backend returned, whatever the result.
pub trait PostOperationHook: Send + Sync {
    fn post_operation(&self, op: &Operation) -> PluginOutcome;
}

/// Runs once per descendant of a subtree rename or delete, before the
/// backend commits.
pub trait SubordinateHook: Send + Sync {
    fn subordinate_modify_dn(&self, op: &mut Operation, old_dn: &Dn, new_dn: &Dn) -> PluginOutcome {
        let _ = (op, old_dn, new_dn);
        PluginOutcome::Continue
    }

    fn subordinate_delete(&self, op: &mut Operation, dn: &Dn) -> PluginOutcome {
        let _ = (op, dn);
        PluginOutcome::Continue
    }
}

/// A plugin registered with the pipeline.
pub trait DirectoryPlugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    fn as_pre_parse(&self) -> Option<&dyn PreParseHook> {
        None
    }

    fn as_pre_operation(&self) -> Option<&dyn PreOperationHook> {
        None
    }

    fn as_post_operation(&self) -> Option<&dyn PostOperationHook> {
        None
    }

    fn as_subordinate(&self) -> Option<&dyn SubordinateHook> {
        None
    }

    /// Whether the plugin may be registered for `plugin_type`. Defaults to
    /// having the matching capability.
    fn supports(&self, plugin_type: PluginType) -> bool {
        match plugin_type.hook_point() {
            HookPoint::PreParse => self.as_pre_parse().is_some(),
            HookPoint::PreOperation => self.as_pre_operation().is_some(),
            HookPoint::PostOperation => self.as_post_operation().is_some(),
            HookPoint::SubordinateModifyDn | HookPoint::SubordinateDelete => {
                self.as_subordinate().is_some()
            }
        }
    }

    /// Called when the plugin is removed from the pipeline.
    fn finalize(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_type_names_round_trip() {
        for t in PluginType::ALL {
            assert_eq!(t.name().parse::<PluginType>().unwrap(), t);
        }
        assert_eq!("PostOperationDelete".parse::<PluginType>().unwrap(), PluginType::PostOperationDelete);
        assert!("postoperationsearch".parse::<PluginType>().is_err());
    }

    #[test]
    fn dispatch_mapping() {
        assert_eq!(
            PluginType::for_dispatch(HookPoint::PreOperation, OperationKind::Add),
            Some(PluginType::PreOperationAdd)
        );
        assert_eq!(
            PluginType::for_dispatch(HookPoint::SubordinateDelete, OperationKind::Delete),
            Some(PluginType::SubordinateDelete)
        );
        assert_eq!(
            PluginType::for_dispatch(HookPoint::PostOperation, OperationKind::SubordinateDelete),
            None
        );
        for t in PluginType::ALL {
            assert_eq!(PluginType::for_dispatch(t.hook_point(), t.operation_kind()), Some(t));
        }
    }
}
