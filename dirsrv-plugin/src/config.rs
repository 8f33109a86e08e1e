//! Administrative configuration changes.
//!
//! A [`ConfigManager`] holds the active configuration for each named
//! component. A change is first offered to every registered listener for
//! validation; only if all accept is it applied and stored. A rejected change
//! leaves the previous configuration active.

use crate::error::{PluginError, PluginResult};
use dirsrv_types::ResultCode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of applying a configuration change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigChangeResult {
    pub result_code: ResultCode,
    /// The change only takes full effect after an administrative action such
    /// as a restart.
    pub admin_action_required: bool,
    /// Operator-facing messages.
    pub messages: Vec<String>,
}

impl ConfigChangeResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Folds another listener's result into this one. The first failure
    /// code wins.
    pub fn merge(&mut self, other: ConfigChangeResult) {
        if self.result_code.is_success() {
            self.result_code = other.result_code;
        }
        self.admin_action_required |= other.admin_action_required;
        self.messages.extend(other.messages);
    }
}

/// Something that validates and applies changes to a configuration of type
/// `C`.
pub trait ConfigChangeListener<C>: Send + Sync {
    /// Returns `Err` with the reasons the change cannot be applied.
    fn is_configuration_change_acceptable(&self, config: &C) -> Result<(), Vec<String>>;

    fn apply_configuration_change(&self, config: &C) -> ConfigChangeResult;
}

struct ConfigEntry<C> {
    current: Arc<C>,
    listeners: Vec<(String, Arc<dyn ConfigChangeListener<C>>)>,
}

/// Active configurations keyed by name, with their change listeners.
pub struct ConfigManager<C> {
    entries: RwLock<HashMap<String, ConfigEntry<C>>>,
}

impl<C> Default for ConfigManager<C> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: Send + Sync + 'static> ConfigManager<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the initial configuration for `name`, replacing any previous
    /// one without consulting listeners.
    pub fn insert(&self, name: impl Into<String>, config: C) {
        let name = name.into();
        let mut entries = self.entries.write();
        match entries.get_mut(&name) {
            Some(entry) => entry.current = Arc::new(config),
            None => {
                entries.insert(
                    name,
                    ConfigEntry {
                        current: Arc::new(config),
                        listeners: Vec::new(),
                    },
                );
            }
        }
    }

    pub fn current(&self, name: &str) -> Option<Arc<C>> {
        self.entries
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.current))
    }

    pub fn register_listener(
        &self,
        name: &str,
        listener_name: impl Into<String>,
        listener: Arc<dyn ConfigChangeListener<C>>,
    ) -> PluginResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PluginError::ConfigNotFound(name.to_string()))?;
        let listener_name = listener_name.into();
        entry.listeners.retain(|(n, _)| *n != listener_name);
        entry.listeners.push((listener_name, listener));
        Ok(())
    }

    /// Returns `true` if a listener was removed.
    pub fn deregister_listener(&self, name: &str, listener_name: &str) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(name) else {
            return false;
        };
        let before = entry.listeners.len();
        entry.listeners.retain(|(n, _)| n != listener_name);
        before != entry.listeners.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.entries
            .read()
            .get(name)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Validates `config` with every listener, then applies and stores it.
    pub fn apply_change(&self, name: &str, config: C) -> PluginResult<ConfigChangeResult> {
        let listeners = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| PluginError::ConfigNotFound(name.to_string()))?;
            entry.listeners.clone()
        };

        let mut reasons = Vec::new();
        for (_, listener) in &listeners {
            if let Err(mut rejected) = listener.is_configuration_change_acceptable(&config) {
                reasons.append(&mut rejected);
            }
        }
        if !reasons.is_empty() {
            warn!(config = %name, reasons = %reasons.join("; "), "Configuration change rejected");
            return Err(PluginError::ConfigRejected {
                name: name.to_string(),
                reasons,
            });
        }

        let mut result = ConfigChangeResult::success();
        for (_, listener) in &listeners {
            result.merge(listener.apply_configuration_change(&config));
        }

        if let Some(entry) = self.entries.write().get_mut(name) {
            entry.current = Arc::new(config);
        }
        info!(
            config = %name,
            admin_action_required = result.admin_action_required,
            "Configuration change applied"
        );
        Ok(result)
    }
}
