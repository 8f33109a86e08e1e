use dirsrv_backend::{
    BackendId, Directory, DirectoryError, DirectoryRuntime, MemoryBackend, ShutdownListener,
};
use dirsrv_types::{Attribute, Dn, Entry, Modification, ResultCode, SearchFilter, SearchScope};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn entry(dir: &Directory, s: &str, attrs: &[(&str, &str)]) -> Entry {
    let dn = dn(s);
    let mut e = Entry::new(dn.clone());
    if let Some(rdn) = dn.rdn() {
        for ava in rdn.avas() {
            e.add_values(&dir.attribute_type(ava.attribute()), [ava.value()]);
        }
    }
    for (name, value) in attrs {
        e.add_values(&dir.attribute_type(name), [*value]);
    }
    e
}

fn directory() -> Directory {
    let dir = Directory::new("/srv/dirsrv");
    dir.add_backend(
        MemoryBackend::new("userRoot", vec![dn("dc=example,dc=com")])
            .with_equality_index("manager")
            .with_equality_index("member"),
    )
    .unwrap();
    dir.add_backend(MemoryBackend::new("otherRoot", vec![dn("o=other")]))
        .unwrap();
    dir.add_backend(MemoryBackend::new("config", vec![dn("cn=config")]).private())
        .unwrap();

    for (s, attrs) in [
        ("dc=example,dc=com", vec![]),
        ("ou=people,dc=example,dc=com", vec![]),
        ("cn=boss,ou=people,dc=example,dc=com", vec![]),
        (
            "uid=a,ou=people,dc=example,dc=com",
            vec![("manager", "cn=boss,ou=people,dc=example,dc=com")],
        ),
        ("o=other", vec![]),
    ] {
        let e = entry(&dir, s, &attrs);
        dir.add_entry(e).unwrap();
    }
    dir
}

// ── Runtime view ──────────────────────────────────────────────────

#[test]
fn public_naming_contexts_skip_private_backends() {
    let dir = directory();
    let mut contexts = dir.public_naming_contexts();
    contexts.sort();
    assert_eq!(contexts, vec![dn("dc=example,dc=com"), dn("o=other")]);
}

#[test]
fn backend_and_naming_context_lookup() {
    let dir = directory();
    let a = dn("uid=a,ou=people,dc=example,dc=com");
    assert_eq!(dir.backend_for(&a), Some(BackendId::new("userRoot")));
    assert_eq!(dir.naming_context_of(&a), Some(dn("dc=example,dc=com")));
    assert_eq!(dir.backend_for(&dn("dc=nowhere")), None);
}

#[test]
fn equality_indexes_are_per_backend() {
    let dir = directory();
    let manager = dir.attribute_type("manager");
    assert!(dir.is_equality_indexed(&manager, &BackendId::new("userRoot")));
    assert!(!dir.is_equality_indexed(&manager, &BackendId::new("otherRoot")));
    assert!(!dir.is_equality_indexed(&manager, &BackendId::new("missing")));
}

#[test]
fn relative_paths_resolve_under_server_root() {
    let dir = directory();
    assert_eq!(
        dir.resolve_path(Path::new("logs/referint")),
        Path::new("/srv/dirsrv/logs/referint")
    );
    assert_eq!(dir.resolve_path(Path::new("/tmp/x")), Path::new("/tmp/x"));
}

// ── Search and internal modify ────────────────────────────────────

#[test]
fn search_by_dn_value_uses_dn_matching() {
    let dir = directory();
    let filter = SearchFilter::equality("manager", "CN=Boss, OU=People, DC=Example, DC=Com");
    let found = dir
        .search(&dn("dc=example,dc=com"), SearchScope::WholeSubtree, &filter)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].dn(), &dn("uid=a,ou=people,dc=example,dc=com"));
}

#[test]
fn search_missing_base_is_no_such_object() {
    let dir = directory();
    let filter = SearchFilter::Present("objectClass".into());
    let err = dir
        .search(&dn("dc=nowhere"), SearchScope::WholeSubtree, &filter)
        .unwrap_err();
    assert_eq!(err.result_code(), ResultCode::NoSuchObject);
}

#[test]
fn internal_modify_is_idempotent() {
    let dir = directory();
    let a = dn("uid=a,ou=people,dc=example,dc=com");
    let manager = dir.attribute_type("manager");
    let mods = vec![Modification::delete(Attribute::new(
        manager.clone(),
        ["cn=boss,ou=people,dc=example,dc=com"],
    ))];
    dir.modify(&a, &mods).unwrap();
    dir.modify(&a, &mods).unwrap();
    assert!(!dir.get_entry(&a).unwrap().has_attribute(&manager));

    let err = dir.modify_entry(&a, &mods).unwrap_err();
    assert_eq!(err.result_code(), ResultCode::NoSuchAttribute);
}

// ── Client operations ─────────────────────────────────────────────

#[test]
fn rename_across_backends_is_refused() {
    let dir = directory();
    let err = dir
        .rename_entry(
            &dn("uid=a,ou=people,dc=example,dc=com"),
            &dn("uid=a,o=other"),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, DirectoryError::UnwillingToPerform(_)));
}

#[test]
fn subtree_delete_reports_descendants() {
    let dir = directory();
    let people = dn("ou=people,dc=example,dc=com");
    assert_eq!(dir.subordinates(&people).unwrap().len(), 2);
    let removed = dir.delete_entry(&people, true).unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(dir.entry_count(), 2);
}

#[test]
fn duplicate_suffix_is_rejected() {
    let dir = directory();
    let err = dir
        .add_backend(MemoryBackend::new("dup", vec![dn("dc=example,dc=com")]))
        .unwrap_err();
    assert!(matches!(err, DirectoryError::BackendConflict(_)));
}

// ── Shutdown ──────────────────────────────────────────────────────

struct Flag(AtomicBool);

impl ShutdownListener for Flag {
    fn shutdown_listener_name(&self) -> String {
        "flag".into()
    }

    fn process_server_shutdown(&self, _reason: &str) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn shutdown_notifies_registered_listeners() {
    let dir = directory();
    let flag = Arc::new(Flag(AtomicBool::new(false)));
    dir.register_shutdown_listener(flag.clone());
    assert_eq!(dir.shutdown_listener_count(), 1);
    dir.shutdown("test");
    assert!(flag.0.load(Ordering::SeqCst));
    assert_eq!(dir.shutdown_listener_count(), 0);
}
