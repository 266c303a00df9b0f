use std::fs;

use novelmill_engine::{ensure_dir, write_atomic};
use tempfile::TempDir;

#[test]
fn creates_missing_directories_recursively() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("a/b/c");
    assert!(!nested.exists());
    ensure_dir(&nested).unwrap();
    assert!(nested.is_dir());
}

#[test]
fn ensure_dir_rejects_a_file_at_the_path() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("occupied");
    fs::write(&file_path, "x").unwrap();
    assert!(ensure_dir(&file_path).is_err());
}

#[test]
fn atomic_write_creates_and_replaces() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("sub/doc.xhtml");

    write_atomic(&target, "hello").unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "hello");

    write_atomic(&target, "world").unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "world");
}

#[test]
fn no_partial_file_when_the_parent_is_not_a_directory() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("blocker");
    fs::write(&blocker, "x").unwrap();

    let target = blocker.join("doc.xhtml");
    assert!(write_atomic(&target, "data").is_err());
    assert!(!target.exists());
}
