//! Unit tests for `AllowlistLoader`.
//!
//! The project override file replaces the fallback only when it is a
//! valid JSON array; every other state falls back silently.

use std::fs;
use std::path::Path;

use command_gate::policy::loader::{AllowlistLoader, ALLOWLIST_PATH};

fn fallback() -> Vec<String> {
    vec!["**/git".to_owned()]
}

fn write_override(root: &Path, content: &str) {
    let path = root.join(ALLOWLIST_PATH);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write override");
}

#[test]
fn missing_file_uses_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(AllowlistLoader::load(temp.path(), &fallback()), fallback());
}

#[test]
fn valid_override_replaces_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_override(temp.path(), r#"["**/cargo", "/usr/bin/make"]"#);

    assert_eq!(
        AllowlistLoader::load(temp.path(), &fallback()),
        vec!["**/cargo".to_owned(), "/usr/bin/make".to_owned()]
    );
}

#[test]
fn empty_array_denies_everything() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_override(temp.path(), "[]");
    assert!(AllowlistLoader::load(temp.path(), &fallback()).is_empty());
}

#[test]
fn malformed_override_uses_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_override(temp.path(), "{ not json");
    assert_eq!(AllowlistLoader::load(temp.path(), &fallback()), fallback());
}

#[test]
fn wrong_shape_uses_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_override(temp.path(), r#"{"allow": ["**/git"]}"#);
    assert_eq!(AllowlistLoader::load(temp.path(), &fallback()), fallback());
}

#[test]
fn blank_file_uses_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_override(temp.path(), "  \n");
    assert_eq!(AllowlistLoader::load(temp.path(), &fallback()), fallback());
}
