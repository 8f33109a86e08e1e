//! Property-based tests for deferred reference repair.
//!
//! - Replaying a written log gives the same directory as repairing each
//!   change synchronously in the same order
//! - A record repeated back to back has the same effect as one copy

use dirsrv_backend::{Directory, DirectoryRuntime, MemoryBackend};
use dirsrv_referint::{
    repair_references, DeferredChangeRecord, ReferentialIntegrityConfig,
    ReferentialIntegrityPlugin, ReferentialIntegrityPluginCfg,
};
use dirsrv_types::{Dn, Entry};
use proptest::prelude::*;
use std::sync::Arc;

const USERS: usize = 6;
const GROUPS: usize = 3;
const POOL: usize = 9;

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn person(i: usize) -> Dn {
    if i < USERS {
        dn(&format!("uid=u{i},ou=people,dc=example,dc=com"))
    } else {
        dn(&format!("uid=n{},ou=people,dc=example,dc=com", i - USERS))
    }
}

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

#[derive(Debug, Clone)]
struct Layout {
    managers: Vec<Option<usize>>,
    members: Vec<Vec<usize>>,
}

fn layout_strategy() -> impl Strategy<Value = Layout> {
    (
        prop::collection::vec(prop::option::of(0..POOL), USERS),
        prop::collection::vec(prop::collection::vec(0..POOL, 0..5), GROUPS),
    )
        .prop_map(|(managers, members)| Layout { managers, members })
}

fn records_strategy() -> impl Strategy<Value = Vec<DeferredChangeRecord>> {
    prop::collection::vec(
        prop_oneof![
            (0..POOL).prop_map(|i| DeferredChangeRecord::Delete(person(i))),
            (0..POOL, 0..POOL)
                .prop_filter("rename to a different DN", |(a, b)| a != b)
                .prop_map(|(a, b)| DeferredChangeRecord::Rename {
                    old_dn: person(a),
                    new_dn: person(b),
                }),
        ],
        0..8,
    )
}

fn build(layout: &Layout, root: &std::path::Path) -> Arc<Directory> {
    let dir = Arc::new(Directory::new(root));
    dir.add_backend(
        MemoryBackend::new("userRoot", vec![dn("dc=example,dc=com")])
            .with_equality_index("manager")
            .with_equality_index("member"),
    )
    .unwrap();

    let manager = dir.attribute_type("manager");
    let member = dir.attribute_type("member");
    for s in [
        "dc=example,dc=com",
        "ou=people,dc=example,dc=com",
        "ou=groups,dc=example,dc=com",
    ] {
        dir.add_entry(Entry::new(dn(s))).unwrap();
    }
    for (i, boss) in layout.managers.iter().enumerate() {
        let mut e = Entry::new(person(i));
        if let Some(boss) = boss {
            e.add_values(&manager, [person(*boss).to_string()]);
        }
        dir.add_entry(e).unwrap();
    }
    for (g, members) in layout.members.iter().enumerate() {
        let mut e = Entry::new(dn(&format!("cn=g{g},ou=groups,dc=example,dc=com")));
        e.add_values(&member, members.iter().map(|m| person(*m).to_string()));
        dir.add_entry(e).unwrap();
    }
    dir
}

fn snapshot(dir: &Directory) -> Vec<Option<Entry>> {
    (0..POOL)
        .map(person)
        .chain((0..GROUPS).map(|g| dn(&format!("cn=g{g},ou=groups,dc=example,dc=com"))))
        .map(|d| dir.entry(&d))
        .collect()
}

fn cfg() -> ReferentialIntegrityPluginCfg {
    let mut cfg = ReferentialIntegrityPluginCfg::new(["manager", "member"]);
    cfg.base_dn = vec![dn("dc=example,dc=com")];
    cfg
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn replay_matches_synchronous_repair(
        layout in layout_strategy(),
        records in records_strategy(),
    ) {
        let sync_root = tempfile::tempdir().unwrap();
        let sync_dir = build(&layout, sync_root.path());
        let config = ReferentialIntegrityConfig::resolve(&cfg(), &*sync_dir).unwrap();
        for record in &records {
            repair_references(&*sync_dir, &config, record.old_dn(), record.new_dn());
        }

        let replay_root = tempfile::tempdir().unwrap();
        let replay_dir = build(&layout, replay_root.path());
        let plugin = ReferentialIntegrityPlugin::initialize(replay_dir.clone(), &cfg()).unwrap();
        plugin.change_log().append(&records).unwrap();
        plugin.process_log_now().unwrap();

        prop_assert_eq!(snapshot(&replay_dir), snapshot(&sync_dir));
        prop_assert!(plugin.change_log().pending().unwrap().is_empty());
    }

    #[test]
    fn repeated_records_repair_once(
        layout in layout_strategy(),
        records in records_strategy(),
    ) {
        let once_root = tempfile::tempdir().unwrap();
        let once_dir = build(&layout, once_root.path());
        let once = ReferentialIntegrityPlugin::initialize(once_dir.clone(), &cfg()).unwrap();
        once.change_log().append(&records).unwrap();
        once.process_log_now().unwrap();

        let doubled: Vec<_> = records
            .iter()
            .flat_map(|r| [r.clone(), r.clone()])
            .collect();
        let twice_root = tempfile::tempdir().unwrap();
        let twice_dir = build(&layout, twice_root.path());
        let twice = ReferentialIntegrityPlugin::initialize(twice_dir.clone(), &cfg()).unwrap();
        twice.change_log().append(&doubled).unwrap();
        let summary = twice.process_log_now().unwrap();

        prop_assert_eq!(summary.failures, 0);
        prop_assert_eq!(snapshot(&twice_dir), snapshot(&once_dir));
    }
}
