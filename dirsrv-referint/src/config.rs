//! Referential integrity configuration.
//!
//! [`ReferentialIntegrityPluginCfg`] is the administrator-facing document,
//! parsed from TOML with kebab-case keys:
//!
//! ```toml
//! attribute-type = ["member", "manager"]
//! base-dn = ["dc=example,dc=com"]
//! check-references = true
//! check-references-scope-criteria = "naming-context"
//! check-references-filter-criteria = ["manager:(objectClass=person)"]
//! log-file = "logs/referint"
//! update-interval = 0
//! ```
//!
//! [`ReferentialIntegrityConfig`] is the resolved, immutable snapshot the
//! plugin works from: attribute names looked up in the schema and filters
//! parsed.

use crate::error::{ReferintError, ReferintResult};
use dirsrv_backend::DirectoryRuntime;
use dirsrv_plugin::PluginType;
use dirsrv_types::{AttributeType, Dn, SearchFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Plugin types the referential integrity plugin can be registered for.
pub const SUPPORTED_PLUGIN_TYPES: [PluginType; 6] = [
    PluginType::PostOperationDelete,
    PluginType::PostOperationModifyDn,
    PluginType::SubordinateModifyDn,
    PluginType::SubordinateDelete,
    PluginType::PreOperationModify,
    PluginType::PreOperationAdd,
];

pub const DEFAULT_LOG_FILE: &str = "logs/referint";

/// Where a referenced entry may live relative to the referencing entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeCriteria {
    /// References may point anywhere in the directory.
    #[default]
    #[serde(alias = "global")]
    Subtree,
    /// References must stay inside the referencing entry's base DN.
    NamingContext,
}

/// The plugin configuration as written by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReferentialIntegrityPluginCfg {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_plugin_types")]
    pub plugin_type: Vec<PluginType>,

    /// Monitored attribute names.
    pub attribute_type: Vec<String>,

    /// Subtrees that are searched and checked. Empty means every public
    /// naming context.
    #[serde(default)]
    pub base_dn: Vec<Dn>,

    #[serde(default)]
    pub check_references: bool,

    #[serde(default)]
    pub check_references_scope_criteria: ScopeCriteria,

    /// `attribute:filter` pairs; a referenced entry must match the filter.
    #[serde(default)]
    pub check_references_filter_criteria: Vec<String>,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Seconds between background passes. Zero repairs references in the
    /// foreground.
    #[serde(default)]
    pub update_interval: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_plugin_types() -> Vec<PluginType> {
    SUPPORTED_PLUGIN_TYPES.to_vec()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

impl ReferentialIntegrityPluginCfg {
    /// A foreground configuration monitoring `attributes` with every other
    /// setting at its default.
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: default_enabled(),
            plugin_type: default_plugin_types(),
            attribute_type: attributes.into_iter().map(Into::into).collect(),
            base_dn: Vec::new(),
            check_references: false,
            check_references_scope_criteria: ScopeCriteria::default(),
            check_references_filter_criteria: Vec::new(),
            log_file: default_log_file(),
            update_interval: 0,
        }
    }

    pub fn from_toml_str(s: &str) -> ReferintResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_from(path: &Path) -> ReferintResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ReferintError::log_io(path, e))?;
        Self::from_toml_str(&contents)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// Checks the configuration against the running server.
    ///
    /// All reasons are collected rather than stopping at the first one.
    pub fn is_acceptable(&self, runtime: &dyn DirectoryRuntime) -> Result<(), Vec<String>> {
        let mut reasons = Vec::new();

        for t in &self.plugin_type {
            if !SUPPORTED_PLUGIN_TYPES.contains(t) {
                reasons.push(format!(
                    "plugin type {t} is not supported by the referential integrity plugin"
                ));
            }
        }

        if self.attribute_type.is_empty() {
            reasons.push("at least one attribute-type must be configured".to_string());
        }

        let base_dns = if self.base_dn.is_empty() {
            runtime.public_naming_contexts()
        } else {
            self.base_dn.clone()
        };

        for name in &self.attribute_type {
            let attr_type = runtime.attribute_type(name);
            if !attr_type.syntax().is_dn_valued() {
                reasons.push(format!(
                    "attribute {} has syntax {}; only DN and name and optional UID syntaxes can be monitored",
                    attr_type.name(),
                    attr_type.syntax()
                ));
            }
            for base in &base_dns {
                let Some(backend) = runtime.backend_for(base) else {
                    continue;
                };
                if !runtime.is_equality_indexed(&attr_type, &backend) {
                    reasons.push(format!(
                        "attribute {} is not indexed for equality in backend {backend}",
                        attr_type.name()
                    ));
                }
            }
        }

        for criterion in &self.check_references_filter_criteria {
            match parse_filter_criterion(criterion) {
                Ok((attr, _)) => {
                    let monitored = self
                        .attribute_type
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(&attr));
                    if !monitored {
                        reasons.push(format!(
                            "attribute {attr} in filter criteria is not a monitored attribute-type"
                        ));
                    }
                }
                Err(reason) => reasons.push(reason),
            }
        }

        reasons.dedup();
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }
}

/// Splits `attribute:filter` at the first colon and parses the filter.
pub fn parse_filter_criterion(criterion: &str) -> Result<(String, SearchFilter), String> {
    let Some((attr, filter)) = criterion.split_once(':') else {
        return Err(format!(
            "filter criteria '{criterion}' must have the form attribute:filter"
        ));
    };
    let attr = attr.trim();
    let filter = filter.trim();
    if attr.is_empty() {
        return Err(format!("filter criteria '{criterion}' names no attribute"));
    }
    let parsed = SearchFilter::parse(filter)
        .map_err(|e| format!("filter '{filter}' cannot be parsed: {e}"))?;
    Ok((attr.to_string(), parsed))
}

/// Resolved configuration snapshot.
#[derive(Debug, Clone)]
pub struct ReferentialIntegrityConfig {
    pub enabled: bool,
    pub attribute_types: Vec<AttributeType>,
    pub base_dns: Vec<Dn>,
    pub check_references: bool,
    pub scope: ScopeCriteria,
    pub attribute_filters: Vec<(AttributeType, SearchFilter)>,
    pub log_file: PathBuf,
    pub update_interval: Duration,
}

impl ReferentialIntegrityConfig {
    /// Resolves attribute names and filters. Call after `is_acceptable`;
    /// an unparsable filter is reported as a configuration error.
    pub fn resolve(
        cfg: &ReferentialIntegrityPluginCfg,
        runtime: &dyn DirectoryRuntime,
    ) -> ReferintResult<Self> {
        let mut attribute_types: Vec<AttributeType> = Vec::new();
        for name in &cfg.attribute_type {
            let attr_type = runtime.attribute_type(name);
            if !attribute_types.contains(&attr_type) {
                attribute_types.push(attr_type);
            }
        }

        let mut base_dns: Vec<Dn> = Vec::new();
        for base in &cfg.base_dn {
            if !base_dns.contains(base) {
                base_dns.push(base.clone());
            }
        }

        let attribute_filters = cfg
            .check_references_filter_criteria
            .iter()
            .map(|criterion| {
                parse_filter_criterion(criterion)
                    .map(|(attr, filter)| (runtime.attribute_type(&attr), filter))
                    .map_err(|reason| ReferintError::Configuration(vec![reason]))
            })
            .collect::<ReferintResult<Vec<_>>>()?;

        Ok(Self {
            enabled: cfg.enabled,
            attribute_types,
            base_dns,
            check_references: cfg.check_references,
            scope: cfg.check_references_scope_criteria,
            attribute_filters,
            log_file: cfg.log_file.clone(),
            update_interval: cfg.update_interval(),
        })
    }

    pub fn is_background(&self) -> bool {
        !self.update_interval.is_zero()
    }

    pub fn is_monitored(&self, attr_type: &AttributeType) -> bool {
        self.attribute_types.contains(attr_type)
    }

    pub fn filter_for(&self, attr_type: &AttributeType) -> Option<&SearchFilter> {
        self.attribute_filters
            .iter()
            .find(|(t, _)| t == attr_type)
            .map(|(_, f)| f)
    }

    /// Configured base DNs, or the public naming contexts when none are
    /// configured.
    pub fn base_dns_to_search(&self, runtime: &dyn DirectoryRuntime) -> Vec<Dn> {
        if self.base_dns.is_empty() {
            runtime.public_naming_contexts()
        } else {
            self.base_dns.clone()
        }
    }

    /// The base DN strictly containing `dn`, if any.
    pub fn entry_base_dn(&self, dn: &Dn, runtime: &dyn DirectoryRuntime) -> Option<Dn> {
        self.base_dns_to_search(runtime)
            .into_iter()
            .find(|base| dn.is_strict_descendant_of(base))
    }
}
