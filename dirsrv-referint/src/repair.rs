//! Reference repair.
//!
//! For a deleted or renamed entry, every entry under each base DN that
//! references it through a monitored attribute gets one internal modify:
//! the old value is removed and, for a rename, the new value added.

use crate::changelog::DeferredChangeRecord;
use crate::config::ReferentialIntegrityConfig;
use dirsrv_backend::{DirectoryError, DirectoryRuntime};
use dirsrv_types::{Attribute, Dn, Modification, SearchFilter, SearchScope};
use tracing::{debug, error, info};

/// Counters for one repair run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Entries successfully modified.
    pub entries_updated: usize,
    /// Internal modifies that failed.
    pub failures: usize,
    /// Base DN searches that failed for a reason other than a missing base.
    pub search_failures: usize,
}

impl RepairSummary {
    pub fn merge(&mut self, other: RepairSummary) {
        self.entries_updated += other.entries_updated;
        self.failures += other.failures;
        self.search_failures += other.search_failures;
    }
}

/// Repairs references to one changed entry. `new_dn` is `None` for a delete.
pub fn repair_references(
    runtime: &dyn DirectoryRuntime,
    config: &ReferentialIntegrityConfig,
    old_dn: &Dn,
    new_dn: Option<&Dn>,
) -> RepairSummary {
    let mut summary = RepairSummary::default();
    for base_dn in config.base_dns_to_search(runtime) {
        summary.merge(repair_in_base(runtime, config, &base_dn, old_dn, new_dn));
    }
    summary
}

/// Repairs a set of changes. Each base DN is processed in turn, and within
/// it the records in order.
pub fn repair_all(
    runtime: &dyn DirectoryRuntime,
    config: &ReferentialIntegrityConfig,
    records: &[DeferredChangeRecord],
) -> RepairSummary {
    let mut summary = RepairSummary::default();
    if records.is_empty() {
        return summary;
    }
    for base_dn in config.base_dns_to_search(runtime) {
        for record in records {
            summary.merge(repair_in_base(
                runtime,
                config,
                &base_dn,
                record.old_dn(),
                record.new_dn(),
            ));
        }
    }
    summary
}

/// The equality filter matching any monitored attribute holding `old_dn`.
pub fn reference_filter(config: &ReferentialIntegrityConfig, old_dn: &Dn) -> SearchFilter {
    let value = old_dn.to_string();
    SearchFilter::or(
        config
            .attribute_types
            .iter()
            .map(|t| SearchFilter::equality(t.name(), value.clone()))
            .collect(),
    )
}

pub(crate) fn repair_in_base(
    runtime: &dyn DirectoryRuntime,
    config: &ReferentialIntegrityConfig,
    base_dn: &Dn,
    old_dn: &Dn,
    new_dn: Option<&Dn>,
) -> RepairSummary {
    let mut summary = RepairSummary::default();
    if config.attribute_types.is_empty() {
        return summary;
    }

    let filter = reference_filter(config, old_dn);
    let entries = match runtime.search(base_dn, SearchScope::WholeSubtree, &filter) {
        Ok(entries) => entries,
        Err(DirectoryError::NoSuchObject(_)) => {
            info!(base_dn = %base_dn, "Base DN does not exist, skipping reference search");
            return summary;
        }
        Err(e) => {
            error!(base_dn = %base_dn, filter = %filter, error = %e, "Reference search failed");
            summary.search_failures += 1;
            return summary;
        }
    };

    for entry in entries {
        let mut modifications = Vec::new();
        for attr_type in &config.attribute_types {
            if !entry.has_value(attr_type, &old_dn.to_string()) {
                continue;
            }
            modifications.push(Modification::delete(Attribute::new(
                attr_type.clone(),
                [old_dn.to_string()],
            )));
            if let Some(new_dn) = new_dn {
                modifications.push(Modification::add(Attribute::new(
                    attr_type.clone(),
                    [new_dn.to_string()],
                )));
            }
        }
        if modifications.is_empty() {
            continue;
        }

        match runtime.modify(entry.dn(), &modifications) {
            Ok(()) => {
                debug!(entry = %entry.dn(), old_dn = %old_dn, "References updated");
                summary.entries_updated += 1;
            }
            Err(e) => {
                error!(
                    entry = %entry.dn(),
                    old_dn = %old_dn,
                    result = %e.result_code(),
                    error = %e,
                    "Failed to update references"
                );
                summary.failures += 1;
            }
        }
    }
    summary
}
