//! State store and config integration tests: error messages, recovery of
//! malformed records, and per-workspace scoping.

use std::fs;
use std::path::PathBuf;

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use teamrules_core::{
    config,
    state::{self, FileStateStore, StateStore},
    RegistryDescriptor, StateError, WorkspaceKey,
};

fn descriptor(storage: PathBuf) -> RegistryDescriptor {
    RegistryDescriptor::new(
        "https://git.example.com/team/rules.git",
        storage,
        vec![".cursor/rules/style.mdc".to_string()],
    )
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn corrupt_state_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let key = WorkspaceKey::for_workspace(home.path());
    let path = state::state_path_at(home.path(), &key);
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(&path, b"{ not json").expect("write");

    let err = FileStateStore::at(home.path()).load(&key).unwrap_err();
    assert!(matches!(err, StateError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains(&format!("{}.json", key.0)));
}

#[test]
fn corrupt_config_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".teamrules/config.yaml")
        .write_str("extensions: {unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, StateError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn record_without_added_at_still_loads() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let key = WorkspaceKey::from("teamRegistry.12345678");
    home.child(".teamrules/state/teamRegistry.12345678.json")
        .write_str(
            r#"{"remoteUrl":"u","storageLocation":"/s","files":["rules/a.mdc"]}"#,
        )
        .expect("write");

    let loaded = FileStateStore::at(home.path())
        .load(&key)
        .expect("load")
        .expect("record present");
    assert_eq!(loaded.files, vec!["rules/a.mdc".to_string()]);
}

// ---------------------------------------------------------------------------
// 2. Persistence layout
// ---------------------------------------------------------------------------

#[test]
fn save_writes_json_under_state_dir() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let key = WorkspaceKey::for_workspace(&home.path().join("workspace"));
    let storage = state::storage_root_at(home.path()).join(&key.0);
    FileStateStore::at(home.path())
        .save(&key, &descriptor(storage))
        .expect("save");

    home.child(format!(".teamrules/state/{}.json", key.0))
        .assert(predicate::str::contains("\"remoteUrl\""))
        .assert(predicate::str::contains(".cursor/rules/style.mdc"));
}

#[test]
fn workspaces_do_not_collide() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = FileStateStore::at(home.path());
    let a = WorkspaceKey::for_workspace(&home.path().join("a"));
    let b = WorkspaceKey::for_workspace(&home.path().join("b"));

    store.save(&a, &descriptor(PathBuf::from("/s/a"))).expect("save a");
    assert!(store.load(&b).expect("load b").is_none());
    store.save(&b, &descriptor(PathBuf::from("/s/b"))).expect("save b");
    store.clear(&a).expect("clear a");

    assert!(store.load(&a).expect("load a").is_none());
    assert_eq!(
        store.load(&b).expect("load b").map(|d| d.storage_location),
        Some(PathBuf::from("/s/b"))
    );
}
