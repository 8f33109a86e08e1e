//! Drives one client request through the plugin pipeline and the directory.
//!
//! ```text
//! pre-parse -> (modify: build modified entry) -> pre-operation
//!   -> subordinate-* per descendant -> backend commit -> post-operation
//! ```
//!
//! A non-`Continue` outcome before the commit ends processing with that
//! outcome. Post-operation plugins always run once the commit was attempted
//! and see its result code.

use dirsrv_backend::{Directory, DirectoryError};
use dirsrv_plugin::{HookPoint, Operation, OperationRequest, PluginPipeline, SubordinateStep};
use dirsrv_types::ResultCode;
use std::sync::Arc;
use tracing::debug;

/// What the client is told about its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    pub result_code: ResultCode,
    pub message: Option<String>,
    /// The client connection must be closed.
    pub disconnect: bool,
}

impl OperationResponse {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }
}

impl From<&Operation> for OperationResponse {
    fn from(op: &Operation) -> Self {
        Self {
            result_code: op.result_code,
            message: op.message.clone(),
            disconnect: op.disconnect,
        }
    }
}

pub struct OperationProcessor {
    directory: Arc<Directory>,
    pipeline: Arc<PluginPipeline>,
}

impl OperationProcessor {
    pub fn new(directory: Arc<Directory>, pipeline: Arc<PluginPipeline>) -> Self {
        Self {
            directory,
            pipeline,
        }
    }

    /// Runs one request through the pipeline and the directory.
    pub fn process(&self, request: OperationRequest) -> OperationResponse {
        let mut op = Operation::new(request);
        debug!(operation = %op.id(), kind = ?op.kind(), dn = %op.target_dn(), "Processing operation");

        if self.run_pre_commit(&mut op) {
            self.commit(&mut op);
            self.pipeline.dispatch(HookPoint::PostOperation, &mut op);
        }

        debug!(
            operation = %op.id(),
            result = %op.result_code,
            disconnect = op.disconnect,
            "Operation complete"
        );
        OperationResponse::from(&op)
    }

    /// Returns `false` when processing must stop before the commit.
    fn run_pre_commit(&self, op: &mut Operation) -> bool {
        if !self.pipeline.dispatch(HookPoint::PreParse, op).is_continue() {
            return false;
        }

        if let OperationRequest::Modify { dn, modifications } = &op.request {
            let modified = match self.directory.entry(dn) {
                Some(mut entry) => entry
                    .apply_all(modifications, false)
                    .map(|()| entry)
                    .map_err(|e| (e.result_code(), e.to_string())),
                None => Err((ResultCode::NoSuchObject, format!("entry {dn} does not exist"))),
            };
            match modified {
                Ok(entry) => op.modified_entry = Some(entry),
                Err((code, message)) => {
                    op.set_result(code, message);
                    return false;
                }
            }
        }

        if !self.pipeline.dispatch(HookPoint::PreOperation, op).is_continue() {
            return false;
        }

        self.run_subordinate_hooks(op)
    }

    fn run_subordinate_hooks(&self, op: &mut Operation) -> bool {
        let (point, steps) = match &op.request {
            OperationRequest::Delete { dn, subtree: true } => {
                let descendants = match self.directory.subordinates(dn) {
                    Ok(descendants) => descendants,
                    Err(e) => return fail(op, &e),
                };
                let steps = descendants
                    .into_iter()
                    .map(|dn| SubordinateStep::Deleted { dn })
                    .collect::<Vec<_>>();
                (HookPoint::SubordinateDelete, steps)
            }
            OperationRequest::ModifyDn { dn, .. } => {
                let Some(new_dn) = op.request.new_dn() else {
                    let message = format!("entry {dn} cannot be renamed");
                    op.set_result(ResultCode::UnwillingToPerform, message);
                    return false;
                };
                let descendants = match self.directory.subordinates(dn) {
                    Ok(descendants) => descendants,
                    Err(e) => return fail(op, &e),
                };
                let steps = descendants
                    .into_iter()
                    .filter_map(|old_dn| {
                        let new_child = old_dn.rebase(dn, &new_dn)?;
                        Some(SubordinateStep::Renamed {
                            old_dn,
                            new_dn: new_child,
                        })
                    })
                    .collect::<Vec<_>>();
                (HookPoint::SubordinateModifyDn, steps)
            }
            _ => return true,
        };

        for step in steps {
            op.set_subordinate_step(Some(step));
            let outcome = self.pipeline.dispatch(point, op);
            if !outcome.is_continue() {
                op.set_subordinate_step(None);
                return false;
            }
        }
        op.set_subordinate_step(None);
        true
    }

    fn commit(&self, op: &mut Operation) {
        let result = match &op.request {
            OperationRequest::Add { entry } => self.directory.add_entry(entry.clone()),
            OperationRequest::Modify { dn, modifications } => {
                self.directory.modify_entry(dn, modifications)
            }
            OperationRequest::Delete { dn, subtree } => {
                self.directory.delete_entry(dn, *subtree).map(|_| ())
            }
            OperationRequest::ModifyDn {
                dn, delete_old_rdn, ..
            } => match op.request.new_dn() {
                Some(new_dn) => self
                    .directory
                    .rename_entry(dn, &new_dn, *delete_old_rdn)
                    .map(|_| ()),
                None => Err(DirectoryError::UnwillingToPerform(format!(
                    "entry {dn} cannot be renamed"
                ))),
            },
        };
        if let Err(e) = result {
            fail(op, &e);
        }
    }
}

fn fail(op: &mut Operation, error: &DirectoryError) -> bool {
    op.set_result(error.result_code(), error.to_string());
    false
}
