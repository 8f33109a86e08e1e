//! Ordered plugin dispatch.
//!
//! Plugins run in registration order. The first outcome other than
//! `Continue` ends dispatch and is recorded on the operation. A panicking
//! plugin is reported as `Stop(Other)` instead of unwinding into the caller.

use crate::error::{PluginError, PluginResult};
use crate::hook::{DirectoryPlugin, HookPoint, PluginOutcome, PluginType};
use crate::operation::{Operation, SubordinateStep};
use dirsrv_types::ResultCode;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

struct Registration {
    plugin: Arc<dyn DirectoryPlugin>,
    types: BTreeSet<PluginType>,
}

/// The plugin registry every operation is dispatched through.
#[derive(Default)]
pub struct PluginPipeline {
    registrations: RwLock<Vec<Registration>>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    // ================================================================
    // Registration
    // ================================================================

    /// Registers `plugin` for `types`, after every plugin already registered.
    ///
    /// Fails if the name is taken or the plugin does not support one of the
    /// requested types.
    pub fn register(
        &self,
        plugin: Arc<dyn DirectoryPlugin>,
        types: impl IntoIterator<Item = PluginType>,
    ) -> PluginResult<()> {
        let name = plugin.name().to_string();
        let types = types.into_iter().collect::<BTreeSet<_>>();
        if types.is_empty() {
            return Err(PluginError::NoPluginTypes(name));
        }
        if let Some(unsupported) = types.iter().find(|t| !plugin.supports(**t)) {
            return Err(PluginError::UnsupportedPluginType {
                plugin: name,
                plugin_type: *unsupported,
            });
        }

        let mut registrations = self.registrations.write();
        if registrations.iter().any(|r| r.plugin.name() == name) {
            return Err(PluginError::PluginAlreadyRegistered(name));
        }
        info!(
            plugin = %name,
            types = %types.iter().map(PluginType::name).collect::<Vec<_>>().join(","),
            "Plugin registered"
        );
        registrations.push(Registration { plugin, types });
        Ok(())
    }

    /// Removes a plugin and calls its `finalize`.
    pub fn deregister(&self, name: &str) -> PluginResult<()> {
        let removed = {
            let mut registrations = self.registrations.write();
            let idx = registrations
                .iter()
                .position(|r| r.plugin.name() == name)
                .ok_or_else(|| PluginError::PluginNotFound(name.to_string()))?;
            registrations.remove(idx)
        };
        removed.plugin.finalize();
        info!(plugin = %name, "Plugin deregistered");
        Ok(())
    }

    /// Deregisters every plugin, most recently registered first.
    pub fn finalize_all(&self) {
        let drained = std::mem::take(&mut *self.registrations.write());
        for registration in drained.into_iter().rev() {
            registration.plugin.finalize();
            info!(plugin = %registration.plugin.name(), "Plugin deregistered");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations
            .read()
            .iter()
            .any(|r| r.plugin.name() == name)
    }

    /// Names of the plugins registered for `plugin_type`, in dispatch order.
    pub fn plugins_for(&self, plugin_type: PluginType) -> Vec<String> {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.types.contains(&plugin_type))
            .map(|r| r.plugin.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ================================================================
    // Dispatch
    // ================================================================

    /// Runs every plugin registered for `point` and the operation's kind.
    ///
    /// Subordinate hook points read the descendant from the operation's
    /// current subordinate step.
    pub fn dispatch(&self, point: HookPoint, op: &mut Operation) -> PluginOutcome {
        let Some(plugin_type) = PluginType::for_dispatch(point, op.kind()) else {
            return PluginOutcome::Continue;
        };

        // Snapshot so plugins can register or deregister while running.
        let plugins = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.types.contains(&plugin_type))
            .map(|r| Arc::clone(&r.plugin))
            .collect::<Vec<_>>();

        for plugin in plugins {
            let outcome = invoke(plugin.as_ref(), point, op);
            if !outcome.is_continue() {
                debug!(
                    plugin = %plugin.name(),
                    plugin_type = %plugin_type,
                    operation = %op.id(),
                    outcome = ?outcome,
                    "Plugin stopped dispatch"
                );
                outcome.apply_to(op);
                return outcome;
            }
        }
        PluginOutcome::Continue
    }
}

fn invoke(plugin: &dyn DirectoryPlugin, point: HookPoint, op: &mut Operation) -> PluginOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| match point {
        HookPoint::PreParse => plugin
            .as_pre_parse()
            .map_or(PluginOutcome::Continue, |hook| hook.pre_parse(op)),
        HookPoint::PreOperation => plugin
            .as_pre_operation()
            .map_or(PluginOutcome::Continue, |hook| hook.pre_operation(op)),
        HookPoint::PostOperation => plugin
            .as_post_operation()
            .map_or(PluginOutcome::Continue, |hook| hook.post_operation(op)),
        HookPoint::SubordinateModifyDn | HookPoint::SubordinateDelete => {
            let (Some(hook), Some(step)) = (plugin.as_subordinate(), op.subordinate_step().cloned())
            else {
                return PluginOutcome::Continue;
            };
            match step {
                SubordinateStep::Renamed { old_dn, new_dn } => {
                    hook.subordinate_modify_dn(op, &old_dn, &new_dn)
                }
                SubordinateStep::Deleted { dn } => hook.subordinate_delete(op, &dn),
            }
        }
    }));

    result.unwrap_or_else(|payload| {
        let detail = panic_message(payload.as_ref());
        error!(
            plugin = %plugin.name(),
            hook_point = %point,
            operation = %op.id(),
            "Plugin panicked: {}",
            detail
        );
        PluginOutcome::stop(
            ResultCode::Other,
            format!(
                "plugin {} failed during {} processing: {}",
                plugin.name(),
                point,
                detail
            ),
        )
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::PreOperationHook;
    use crate::operation::OperationRequest;
    use dirsrv_types::Dn;

    struct Rejecting;

    impl PreOperationHook for Rejecting {
        fn pre_operation(&self, _op: &mut Operation) -> PluginOutcome {
            PluginOutcome::stop(ResultCode::UnwillingToPerform, "no")
        }
    }

    impl DirectoryPlugin for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn as_pre_operation(&self) -> Option<&dyn PreOperationHook> {
            Some(self)
        }
    }

    fn delete_op() -> Operation {
        Operation::new(OperationRequest::Delete {
            dn: Dn::parse("uid=a,o=test").unwrap(),
            subtree: false,
        })
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let pipeline = PluginPipeline::new();
        let err = pipeline
            .register(Arc::new(Rejecting), [PluginType::PostOperationDelete])
            .unwrap_err();
        assert!(matches!(err, PluginError::UnsupportedPluginType { .. }));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn stop_is_recorded_on_operation() {
        let pipeline = PluginPipeline::new();
        pipeline
            .register(Arc::new(Rejecting), [PluginType::PreOperationDelete])
            .unwrap();
        let mut op = delete_op();
        let outcome = pipeline.dispatch(HookPoint::PreOperation, &mut op);
        assert!(!outcome.is_continue());
        assert_eq!(op.result_code, ResultCode::UnwillingToPerform);
        assert_eq!(op.message.as_deref(), Some("no"));
        assert!(!op.disconnect);
    }

    #[test]
    fn unregistered_kind_continues() {
        let pipeline = PluginPipeline::new();
        pipeline
            .register(Arc::new(Rejecting), [PluginType::PreOperationAdd])
            .unwrap();
        let mut op = delete_op();
        assert!(pipeline.dispatch(HookPoint::PreOperation, &mut op).is_continue());
        assert!(op.is_success());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let pipeline = PluginPipeline::new();
        pipeline
            .register(Arc::new(Rejecting), [PluginType::PreOperationAdd])
            .unwrap();
        assert!(matches!(
            pipeline.register(Arc::new(Rejecting), [PluginType::PreOperationDelete]),
            Err(PluginError::PluginAlreadyRegistered(_))
        ));
        pipeline.deregister("rejecting").unwrap();
        assert!(matches!(
            pipeline.deregister("rejecting"),
            Err(PluginError::PluginNotFound(_))
        ));
    }
}
