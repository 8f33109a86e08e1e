//! Pre-operation reference validation for Add and Modify.

use crate::config::{ReferentialIntegrityConfig, ScopeCriteria};
use dirsrv_backend::DirectoryRuntime;
use dirsrv_plugin::PluginOutcome;
use dirsrv_types::{
    split_optional_uid, Attribute, Dn, Entry, Modification, ModificationKind, ResultCode, Syntax,
};

/// Validates every monitored attribute of an entry about to be added.
pub fn check_add(
    config: &ReferentialIntegrityConfig,
    runtime: &dyn DirectoryRuntime,
    entry: &Entry,
) -> PluginOutcome {
    if !config.check_references {
        return PluginOutcome::Continue;
    }
    let entry_dn = entry.dn();
    let Some(entry_base) = config.entry_base_dn(entry_dn, runtime) else {
        return PluginOutcome::Continue;
    };

    for attr_type in &config.attribute_types {
        if let Some(attr) = entry.attribute(attr_type) {
            let outcome = check_attribute(config, runtime, attr, entry_dn, &entry_base);
            if !outcome.is_continue() {
                return outcome;
            }
        }
    }
    PluginOutcome::Continue
}

/// Validates the monitored attributes named by Add and Replace
/// modifications, using their values in the modified entry.
pub fn check_modify(
    config: &ReferentialIntegrityConfig,
    runtime: &dyn DirectoryRuntime,
    modified_entry: &Entry,
    modifications: &[Modification],
) -> PluginOutcome {
    if !config.check_references {
        return PluginOutcome::Continue;
    }
    let entry_dn = modified_entry.dn();
    let Some(entry_base) = config.entry_base_dn(entry_dn, runtime) else {
        return PluginOutcome::Continue;
    };

    for modification in modifications {
        if modification.kind == ModificationKind::Delete {
            continue;
        }
        let attr_type = modification.attribute.attribute_type();
        if !config.is_monitored(attr_type) {
            continue;
        }
        if let Some(attr) = modified_entry.attribute(attr_type) {
            let outcome = check_attribute(config, runtime, attr, entry_dn, &entry_base);
            if !outcome.is_continue() {
                return outcome;
            }
        }
    }
    PluginOutcome::Continue
}

fn check_attribute(
    config: &ReferentialIntegrityConfig,
    runtime: &dyn DirectoryRuntime,
    attr: &Attribute,
    entry_dn: &Dn,
    entry_base: &Dn,
) -> PluginOutcome {
    let syntax = runtime.attribute_type(attr.name()).syntax();
    let filter = config.filter_for(attr.attribute_type());

    for value in attr.values() {
        let ref_dn = match decode_reference(value, syntax) {
            Ok(dn) => dn,
            Err(e) => {
                return PluginOutcome::stop(
                    ResultCode::Other,
                    format!(
                        "the value '{value}' of attribute {} in entry {entry_dn} cannot be decoded as a DN: {e}",
                        attr.name()
                    ),
                );
            }
        };

        if config.scope == ScopeCriteria::NamingContext && !ref_dn.is_strict_descendant_of(entry_base) {
            return PluginOutcome::stop(
                ResultCode::ConstraintViolation,
                format!(
                    "the entry {ref_dn} referenced by attribute {} of entry {entry_dn} is outside the naming context {entry_base}",
                    attr.name()
                ),
            );
        }

        let Some(referenced) = runtime.get_entry(&ref_dn) else {
            return PluginOutcome::stop(
                ResultCode::ConstraintViolation,
                format!(
                    "the entry {ref_dn} referenced by attribute {} of entry {entry_dn} does not exist",
                    attr.name()
                ),
            );
        };

        if let Some(filter) = filter {
            if !filter.matches(&referenced) {
                return PluginOutcome::stop(
                    ResultCode::ConstraintViolation,
                    format!(
                        "the entry {ref_dn} referenced by attribute {} of entry {entry_dn} does not match the filter {filter}",
                        attr.name()
                    ),
                );
            }
        }
    }
    PluginOutcome::Continue
}

/// Decodes a reference value, dropping the optional `#'…'B` UID of name and
/// optional UID values.
pub(crate) fn decode_reference(value: &str, syntax: Syntax) -> Result<Dn, dirsrv_types::DnError> {
    let dn_part = match syntax {
        Syntax::NameAndOptionalUid => split_optional_uid(value).0,
        _ => value,
    };
    Dn::parse(dn_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_optional_uid() {
        let dn = decode_reference("cn=g,o=test#'0110'B", Syntax::NameAndOptionalUid).unwrap();
        assert_eq!(dn, Dn::parse("cn=g,o=test").unwrap());
        let raw = decode_reference("cn=g,o=test#'0110'B", Syntax::DistinguishedName).unwrap();
        assert_ne!(raw, dn);
        assert!(decode_reference("not a dn", Syntax::DistinguishedName).is_err());
    }
}
