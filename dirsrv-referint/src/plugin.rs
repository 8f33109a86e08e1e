//! The referential integrity plugin.
//!
//! Wires validation, repair and deferred processing into the operation
//! pipeline:
//!
//! - pre-operation Add/Modify: reject references to missing or out-of-scope
//!   entries ([`crate::checks`]),
//! - subordinate Delete/ModifyDN: collect descendant changes on the
//!   operation,
//! - post-operation Delete/ModifyDN: repair references now, or append them to
//!   the [`ChangeLog`] for the [`BackgroundWorker`].

use crate::changelog::{ChangeLog, DeferredChangeRecord};
use crate::checks::{check_add, check_modify};
use crate::config::{
    ReferentialIntegrityConfig, ReferentialIntegrityPluginCfg, SUPPORTED_PLUGIN_TYPES,
};
use crate::error::{ReferintError, ReferintResult};
use crate::repair::{repair_all, repair_in_base, RepairSummary};
use crate::worker::BackgroundWorker;
use dirsrv_backend::{DirectoryRuntime, ShutdownListener};
use dirsrv_plugin::{
    ConfigChangeListener, ConfigChangeResult, DirectoryPlugin, Operation, OperationKind,
    OperationRequest, PluginOutcome, PluginType, PostOperationHook, PreOperationHook,
    SubordinateHook,
};
use dirsrv_types::{Dn, ResultCode};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const PLUGIN_NAME: &str = "Referential Integrity Plugin";

/// The plugin instance. Always held in an `Arc`; see [`Self::initialize`].
pub struct ReferentialIntegrityPlugin {
    me: Weak<Self>,
    runtime: Arc<dyn DirectoryRuntime>,
    config: RwLock<Arc<ReferentialIntegrityConfig>>,
    log: ChangeLog,
    worker: Mutex<Option<BackgroundWorker>>,
}

impl ReferentialIntegrityPlugin {
    /// Validates `cfg`, provisions the log file and, for a non-zero update
    /// interval, starts the background thread and registers for shutdown.
    pub fn initialize(
        runtime: Arc<dyn DirectoryRuntime>,
        cfg: &ReferentialIntegrityPluginCfg,
    ) -> ReferintResult<Arc<Self>> {
        cfg.is_acceptable(runtime.as_ref())
            .map_err(ReferintError::Configuration)?;
        let config = ReferentialIntegrityConfig::resolve(cfg, runtime.as_ref())?;

        let log_path = runtime.resolve_path(&config.log_file);
        let log = ChangeLog::open(&log_path).map_err(|e| {
            ReferintError::Configuration(vec![format!(
                "cannot create log file {}: {e}",
                log_path.display()
            )])
        })?;

        let interval = config.update_interval;
        let plugin = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            runtime,
            config: RwLock::new(Arc::new(config)),
            log,
            worker: Mutex::new(None),
        });

        if !interval.is_zero() {
            plugin.start_worker(interval)?;
        }
        info!(
            plugin = PLUGIN_NAME,
            log_file = %plugin.log.path().display(),
            interval_secs = interval.as_secs(),
            "Plugin initialized"
        );
        Ok(plugin)
    }

    /// The active configuration snapshot.
    pub fn config(&self) -> Arc<ReferentialIntegrityConfig> {
        Arc::clone(&self.config.read())
    }

    /// The resolved path of the deferred-change log.
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// The deferred-change log.
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    /// Returns true while the background update thread is alive.
    pub fn is_worker_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(BackgroundWorker::is_running)
    }

    /// The background update interval, when the thread exists.
    pub fn worker_interval(&self) -> Option<Duration> {
        self.worker.lock().as_ref().map(BackgroundWorker::interval)
    }

    /// Replays any deferred changes now, on the calling thread.
    pub fn process_log_now(&self) -> ReferintResult<RepairSummary> {
        self.process_log(None)
    }

    fn process_log(&self, cancel: Option<&CancellationToken>) -> ReferintResult<RepairSummary> {
        let Some(batch) = self.log.begin_batch()? else {
            return Ok(RepairSummary::default());
        };
        let config = self.config();
        let mut summary = RepairSummary::default();

        for base_dn in config.base_dns_to_search(self.runtime.as_ref()) {
            for record in &batch.records {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    // The batch stays on disk and is replayed on the next pass.
                    info!(records = batch.records.len(), "Deferred update pass interrupted");
                    return Ok(summary);
                }
                summary.merge(repair_in_base(
                    self.runtime.as_ref(),
                    &config,
                    &base_dn,
                    record.old_dn(),
                    record.new_dn(),
                ));
            }
        }

        let records = batch.records.len();
        self.log.finish_batch(batch)?;
        info!(
            records,
            entries_updated = summary.entries_updated,
            failures = summary.failures,
            "Deferred references updated"
        );
        Ok(summary)
    }

    fn start_worker(&self, interval: Duration) -> ReferintResult<()> {
        let mut slot = self.worker.lock();
        self.spawn_worker(&mut slot, interval)
    }

    /// Retunes the worker in `slot`, or starts one and registers for
    /// shutdown notification.
    fn spawn_worker(
        &self,
        slot: &mut Option<BackgroundWorker>,
        interval: Duration,
    ) -> ReferintResult<()> {
        if let Some(worker) = slot.as_ref() {
            worker.set_interval(interval);
            return Ok(());
        }

        let me = self.me.clone();
        let worker = BackgroundWorker::spawn(interval, move |cancel| {
            let Some(plugin) = me.upgrade() else {
                cancel.cancel();
                return;
            };
            if let Err(e) = plugin.process_log(Some(cancel)) {
                error!(error = %e, "Deferred update pass failed, retrying next interval");
            }
        })?;
        *slot = Some(worker);

        if let Some(me) = self.me.upgrade() {
            self.runtime.register_shutdown_listener(me);
        }
        Ok(())
    }

    fn stop_worker(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
            self.runtime.deregister_shutdown_listener(PLUGIN_NAME);
        }
    }

    /// Starts, stops or retunes the worker for a new interval and describes
    /// what happened. The running worker, not the stored configuration, is
    /// the reference for the current interval.
    fn process_interval_change(&self, interval: Duration, result: &mut ConfigChangeResult) {
        let mut slot = self.worker.lock();
        let current = slot
            .as_ref()
            .map_or(Duration::ZERO, BackgroundWorker::interval);
        if current == interval {
            return;
        }

        match (slot.is_some(), interval.is_zero()) {
            (false, false) => match self.spawn_worker(&mut slot, interval) {
                Ok(()) => result.add_message(format!(
                    "Background reference updates starting with an interval of {} seconds",
                    interval.as_secs()
                )),
                Err(e) => {
                    result.result_code = ResultCode::Other;
                    result.add_message(format!("Background reference updates could not start: {e}"));
                }
            },
            (true, true) => {
                result.add_message("Background reference updates stopping; references are now updated immediately");
                if let Some(worker) = slot.take() {
                    worker.stop();
                }
                self.runtime.deregister_shutdown_listener(PLUGIN_NAME);
            }
            (true, false) => {
                if let Some(worker) = slot.as_ref() {
                    worker.set_interval(interval);
                }
                result.add_message(format!(
                    "Background reference update interval changed to {} seconds",
                    interval.as_secs()
                ));
            }
            (false, true) => {}
        }
    }

    fn changes_for(op: &Operation) -> Vec<DeferredChangeRecord> {
        let mut records = Vec::new();
        match &op.request {
            OperationRequest::Delete { dn, .. } => {
                records.push(DeferredChangeRecord::Delete(dn.clone()));
                records.extend(
                    op.subordinate_changes
                        .deleted
                        .iter()
                        .cloned()
                        .map(DeferredChangeRecord::Delete),
                );
            }
            OperationRequest::ModifyDn { dn, .. } => {
                let Some(new_dn) = op.request.new_dn() else {
                    return records;
                };
                records.push(DeferredChangeRecord::Rename {
                    old_dn: dn.clone(),
                    new_dn,
                });
                records.extend(op.subordinate_changes.renamed.iter().map(|(old_dn, new_dn)| {
                    DeferredChangeRecord::Rename {
                        old_dn: old_dn.clone(),
                        new_dn: new_dn.clone(),
                    }
                }));
            }
            _ => {}
        }
        records
    }
}

impl std::fmt::Debug for ReferentialIntegrityPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferentialIntegrityPlugin")
            .field("log", &self.log.path())
            .field("worker_running", &self.is_worker_running())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Pipeline hooks
// ============================================================================

impl DirectoryPlugin for ReferentialIntegrityPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn as_pre_operation(&self) -> Option<&dyn PreOperationHook> {
        Some(self)
    }

    fn as_post_operation(&self) -> Option<&dyn PostOperationHook> {
        Some(self)
    }

    fn as_subordinate(&self) -> Option<&dyn SubordinateHook> {
        Some(self)
    }

    fn supports(&self, plugin_type: PluginType) -> bool {
        SUPPORTED_PLUGIN_TYPES.contains(&plugin_type)
    }

    fn finalize(&self) {
        self.stop_worker();
        self.runtime.deregister_shutdown_listener(PLUGIN_NAME);
        info!(plugin = PLUGIN_NAME, "Plugin finalized");
    }
}

impl PreOperationHook for ReferentialIntegrityPlugin {
    fn pre_operation(&self, op: &mut Operation) -> PluginOutcome {
        let config = self.config();
        if !config.enabled {
            return PluginOutcome::Continue;
        }
        let runtime = self.runtime.as_ref();
        match &op.request {
            OperationRequest::Add { entry } => check_add(&config, runtime, entry),
            OperationRequest::Modify { modifications, .. } => match &op.modified_entry {
                Some(modified) => check_modify(&config, runtime, modified, modifications),
                None => PluginOutcome::Continue,
            },
            _ => PluginOutcome::Continue,
        }
    }
}

impl SubordinateHook for ReferentialIntegrityPlugin {
    fn subordinate_modify_dn(&self, op: &mut Operation, old_dn: &Dn, new_dn: &Dn) -> PluginOutcome {
        op.subordinate_changes
            .record_rename(old_dn.clone(), new_dn.clone());
        PluginOutcome::Continue
    }

    fn subordinate_delete(&self, op: &mut Operation, dn: &Dn) -> PluginOutcome {
        op.subordinate_changes.record_delete(dn.clone());
        PluginOutcome::Continue
    }
}

impl PostOperationHook for ReferentialIntegrityPlugin {
    fn post_operation(&self, op: &Operation) -> PluginOutcome {
        if !op.is_success()
            || !matches!(op.kind(), OperationKind::Delete | OperationKind::ModifyDn)
        {
            return PluginOutcome::Continue;
        }
        let config = self.config();
        if !config.enabled {
            return PluginOutcome::Continue;
        }

        let records = Self::changes_for(op);
        if config.is_background() {
            if let Err(e) = self.log.append(&records) {
                error!(
                    operation = %op.id(),
                    error = %e,
                    "Failed to log deferred reference updates"
                );
            }
        } else {
            let summary = repair_all(self.runtime.as_ref(), &config, &records);
            if summary.failures > 0 {
                warn!(
                    operation = %op.id(),
                    failures = summary.failures,
                    "Some references could not be updated"
                );
            }
        }
        PluginOutcome::Continue
    }
}

// ============================================================================
// Configuration and shutdown
// ============================================================================

impl ConfigChangeListener<ReferentialIntegrityPluginCfg> for ReferentialIntegrityPlugin {
    fn is_configuration_change_acceptable(
        &self,
        config: &ReferentialIntegrityPluginCfg,
    ) -> Result<(), Vec<String>> {
        config.is_acceptable(self.runtime.as_ref())
    }

    fn apply_configuration_change(&self, cfg: &ReferentialIntegrityPluginCfg) -> ConfigChangeResult {
        let mut result = ConfigChangeResult::success();
        let new = match ReferentialIntegrityConfig::resolve(cfg, self.runtime.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                result.result_code = ResultCode::Other;
                result.add_message(e.to_string());
                return result;
            }
        };

        if self.runtime.resolve_path(&new.log_file) != self.log.path() {
            result.admin_action_required = true;
            result.add_message(format!(
                "The log file change to {} takes effect after the server is restarted",
                new.log_file.display()
            ));
        }

        let new_interval = new.update_interval;
        let enabled = new.enabled;
        *self.config.write() = Arc::new(new);

        if enabled {
            self.process_interval_change(new_interval, &mut result);
        }
        result
    }
}

impl ShutdownListener for ReferentialIntegrityPlugin {
    fn shutdown_listener_name(&self) -> String {
        PLUGIN_NAME.to_string()
    }

    fn process_server_shutdown(&self, reason: &str) {
        info!(reason, "Stopping background reference updates for server shutdown");
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}
