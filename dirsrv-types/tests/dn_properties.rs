//! Property-based tests for DN parsing and hierarchy.
//!
//! - Display output re-parses to an equal DN
//! - The normalized form re-parses to an equal DN and is a fixed point
//! - A rebased DN stays below its new base with the same leaf

use dirsrv_types::{Dn, Rdn};
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn attr_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["cn", "ou", "uid", "dc", "o", "CN", "Ou"]).prop_map(str::to_string)
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9 ,+=#\\\\;<>\"]{0,15}[a-zA-Z0-9]")
        .expect("valid regex")
}

fn dn_strategy() -> impl Strategy<Value = Dn> {
    prop::collection::vec((attr_strategy(), value_strategy()), 1..5).prop_map(|parts| {
        parts
            .into_iter()
            .rev()
            .fold(Dn::root(), |dn, (attr, value)| dn.child(Rdn::new(attr, value)))
    })
}

proptest! {
    #[test]
    fn display_reparses_to_equal_dn(dn in dn_strategy()) {
        let reparsed = Dn::parse(&dn.to_string()).unwrap();
        prop_assert_eq!(reparsed, dn);
    }

    #[test]
    fn normalized_form_is_fixed_point(dn in dn_strategy()) {
        let normalized = dn.to_normalized_string();
        let reparsed = Dn::parse(&normalized).unwrap();
        prop_assert_eq!(&reparsed, &dn);
        prop_assert_eq!(reparsed.to_normalized_string(), normalized);
    }

    #[test]
    fn rebase_keeps_leaf_under_new_base(
        dn in dn_strategy(),
        new_base in dn_strategy(),
    ) {
        let old_base = dn.parent().unwrap_or_else(Dn::root);
        let moved = dn.rebase(&old_base, &new_base).unwrap();
        prop_assert!(moved.is_descendant_of(&new_base));
        prop_assert_eq!(moved.rdn(), dn.rdn());
        prop_assert_eq!(moved.len(), new_base.len() + 1);
    }

    #[test]
    fn parents_sort_before_children(dn in dn_strategy()) {
        if let Some(parent) = dn.parent() {
            prop_assert!(parent < dn);
        }
    }
}
