//! The server: directory, plugin pipeline and configuration manager wired
//! together.

use crate::error::{ServerError, ServerResult};
use crate::processor::{OperationProcessor, OperationResponse};
use dirsrv_backend::Directory;
use dirsrv_plugin::{
    ConfigChangeResult, ConfigManager, DirectoryPlugin, OperationRequest, PluginError,
    PluginPipeline,
};
use dirsrv_referint::{ReferentialIntegrityPlugin, ReferentialIntegrityPluginCfg, PLUGIN_NAME};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DirectoryServer {
    directory: Arc<Directory>,
    pipeline: Arc<PluginPipeline>,
    referint_config: ConfigManager<ReferentialIntegrityPluginCfg>,
    processor: OperationProcessor,
    referint: Mutex<Option<Arc<ReferentialIntegrityPlugin>>>,
}

impl DirectoryServer {
    /// Creates a server with an empty plugin pipeline.
    pub fn new(directory: Arc<Directory>) -> Self {
        let pipeline = Arc::new(PluginPipeline::new());
        let processor = OperationProcessor::new(Arc::clone(&directory), Arc::clone(&pipeline));
        Self {
            directory,
            pipeline,
            referint_config: ConfigManager::new(),
            processor,
            referint: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn pipeline(&self) -> &Arc<PluginPipeline> {
        &self.pipeline
    }

    /// Processes one client request.
    pub fn process(&self, request: OperationRequest) -> OperationResponse {
        self.processor.process(request)
    }

    // ================================================================
    // Referential integrity
    // ================================================================

    /// Initializes the plugin, registers it with the pipeline for its
    /// configured plugin types and subscribes it to configuration changes.
    pub fn enable_referential_integrity(
        &self,
        cfg: ReferentialIntegrityPluginCfg,
    ) -> ServerResult<Arc<ReferentialIntegrityPlugin>> {
        let mut slot = self.referint.lock();
        if slot.is_some() {
            return Err(PluginError::PluginAlreadyRegistered(PLUGIN_NAME.to_string()).into());
        }

        let plugin = ReferentialIntegrityPlugin::initialize(self.directory.clone(), &cfg)?;
        if let Err(e) = self
            .pipeline
            .register(plugin.clone(), cfg.plugin_type.iter().copied())
        {
            plugin.finalize();
            return Err(e.into());
        }

        self.referint_config.insert(PLUGIN_NAME, cfg);
        self.referint_config
            .register_listener(PLUGIN_NAME, PLUGIN_NAME, plugin.clone())?;
        *slot = Some(Arc::clone(&plugin));
        info!(plugin = PLUGIN_NAME, "Plugin enabled");
        Ok(plugin)
    }

    /// Loads the plugin configuration from a TOML file and enables it.
    pub fn load_referential_integrity(
        &self,
        path: &Path,
    ) -> ServerResult<Arc<ReferentialIntegrityPlugin>> {
        let cfg = ReferentialIntegrityPluginCfg::load_from(path)?;
        self.enable_referential_integrity(cfg)
    }

    /// The enabled referential integrity plugin, if any.
    pub fn referential_integrity(&self) -> Option<Arc<ReferentialIntegrityPlugin>> {
        self.referint.lock().clone()
    }

    /// The active referential integrity configuration, if enabled.
    pub fn referential_integrity_config(&self) -> Option<Arc<ReferentialIntegrityPluginCfg>> {
        self.referint_config.current(PLUGIN_NAME)
    }

    /// Applies an administrative change. A rejected change leaves the
    /// current configuration active.
    pub fn change_referential_integrity(
        &self,
        cfg: ReferentialIntegrityPluginCfg,
    ) -> ServerResult<ConfigChangeResult> {
        if self.referint.lock().is_none() {
            return Err(ServerError::ReferintNotEnabled);
        }
        let current = self
            .referential_integrity_config()
            .ok_or(ServerError::ReferintNotEnabled)?;
        let types_changed = current.plugin_type.iter().collect::<BTreeSet<_>>()
            != cfg.plugin_type.iter().collect::<BTreeSet<_>>();

        let mut result = self.referint_config.apply_change(PLUGIN_NAME, cfg)?;
        if types_changed {
            result.admin_action_required = true;
            result.add_message("The plugin type change takes effect after the server is restarted");
        }
        for message in &result.messages {
            info!(plugin = PLUGIN_NAME, message = %message, "Configuration change");
        }
        Ok(result)
    }

    /// Removes the plugin from the pipeline and the configuration manager.
    pub fn disable_referential_integrity(&self) -> ServerResult<()> {
        let Some(_plugin) = self.referint.lock().take() else {
            return Err(ServerError::ReferintNotEnabled);
        };
        self.referint_config
            .deregister_listener(PLUGIN_NAME, PLUGIN_NAME);
        self.pipeline.deregister(PLUGIN_NAME)?;
        Ok(())
    }

    /// Notifies shutdown listeners and finalizes every plugin.
    pub fn shutdown(&self, reason: &str) {
        info!(reason, "Server shutting down");
        self.directory.shutdown(reason);
        self.pipeline.finalize_all();
        let plugin = self.referint.lock().take();
        if let Some(plugin) = plugin {
            self.referint_config
                .deregister_listener(PLUGIN_NAME, PLUGIN_NAME);
            if plugin.change_log().has_pending() {
                warn!(
                    log_file = %plugin.log_path().display(),
                    "Deferred reference updates remain and will be replayed after restart"
                );
            }
        }
    }
}
