//! Integration tests for error handling.
//!
//! Tests that errors are properly returned for invalid operations.

mod common;

use common::{BRANCH, FOLDER, TestEnv, fields};
use gittkt::{
    DefaultProvider, FieldSchema, FieldSpec, GitTree, PullOptions, Store, StoreError, TreeError, ValidationError,
    VersionedTree,
};
use tempfile::TempDir;

// =============================================================================
// Lookup Errors
// =============================================================================

#[test]
fn test_get_unknown_number() {
    let mut env = TestEnv::new();
    env.add("only");

    let err = env.store.get(FOLDER, "2").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn test_get_unknown_global_id() {
    let mut env = TestEnv::new();
    env.add("only");

    let err = env
        .store
        .get(FOLDER, "00000000-0000-4000-8000-000000000000")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn test_get_in_empty_folder() {
    let mut env = TestEnv::new();
    assert!(matches!(env.store.get(FOLDER, "1"), Err(StoreError::NotFound(_))));
}

#[test]
fn test_malformed_short_keys() {
    let mut env = TestEnv::new();
    env.add("only");

    for key in ["abc", "0", "-1", "1.5", "", "#1"] {
        let err = env.store.get(FOLDER, key).unwrap_err();
        assert!(
            matches!(err, StoreError::Validation(ValidationError::MalformedKey(_))),
            "key {:?} gave {:?}",
            key,
            err
        );
    }
}

#[test]
fn test_edit_unknown_ticket() {
    let mut env = TestEnv::new();
    let err = env.store.edit(FOLDER, "1", &fields(&[("name", "x")])).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// =============================================================================
// Validation Errors
// =============================================================================

#[test]
fn test_edit_read_only_field() {
    let mut env = TestEnv::new();
    env.add("mine");

    let err = env
        .store
        .edit(FOLDER, "1", &fields(&[("author", "someone else")]))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::ReadOnlyField(ref name)) if name == "author"
    ));
    assert_eq!(
        env.store.get(FOLDER, "1").unwrap().fields.get("author"),
        Some("Test User <test@example.com>")
    );
}

#[test]
fn test_add_missing_required_field() {
    let temp_dir = TempDir::new().unwrap();
    let tree = GitTree::init(temp_dir.path()).unwrap();
    let schema = FieldSchema::new(vec![FieldSpec::new("summary", DefaultProvider::Required)]).unwrap();
    let mut store = Store::new(tree, BRANCH).with_schema(schema);

    let err = store.add(FOLDER, &fields(&[("other", "x")])).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::MissingField(ref name)) if name == "summary"
    ));
    assert!(store.tree().resolve(BRANCH).unwrap().is_none());
}

#[test]
fn test_invalid_folder_names() {
    let mut env = TestEnv::new();
    for folder in ["", ".", "..", "a/b"] {
        let err = env.store.add(folder, &fields(&[("name", "x")])).unwrap_err();
        assert!(
            matches!(err, StoreError::Validation(ValidationError::InvalidFolder(_))),
            "folder {:?} gave {:?}",
            folder,
            err
        );
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

#[test]
fn test_corrupt_index_is_reported() {
    let mut env = TestEnv::new();
    env.add("a");
    env.store
        .tree_mut()
        .write(BRANCH, &format!("{}/index", FOLDER), b"1\tnot valid\n")
        .unwrap();
    env.store.tree_mut().commit(BRANCH, "break index").unwrap();

    let tree = GitTree::open(env.temp_dir.path()).unwrap();
    let mut reopened = Store::new(tree, BRANCH);
    let err = reopened.list(FOLDER).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { ref path, .. } if path == "active/index"));
}

#[test]
fn test_corrupt_record_is_reported() {
    let mut env = TestEnv::new();
    let ticket = env.add("a");
    let path = format!("{}/{}", FOLDER, ticket.id);
    env.store.tree_mut().write(BRANCH, &path, b"{ not json").unwrap();
    env.store.tree_mut().commit(BRANCH, "break record").unwrap();

    let err = env.store.get(FOLDER, "1").unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}

#[test]
fn test_open_outside_repository() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist");
    assert!(matches!(GitTree::open(&missing), Err(TreeError::Git(_))));
}

#[test]
fn test_pull_unknown_remote_name() {
    let mut env = TestEnv::new();
    let err = env
        .store
        .pull("upstream", BRANCH, PullOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::Storage(TreeError::RemoteNotFound(_))));
}

#[test]
fn test_error_messages() {
    let err = StoreError::NotFound("#3 in folder active".into());
    assert_eq!(err.to_string(), "ticket not found: #3 in folder active");

    let err = StoreError::from(ValidationError::ReadOnlyField("author".into()));
    assert_eq!(err.to_string(), "validation error: field 'author' is not editable");

    let err = StoreError::MergeConflict {
        tickets: vec!["active/a".into(), "active/b".into()],
    };
    assert_eq!(err.to_string(), "tickets changed on both sides: active/a, active/b");
}
