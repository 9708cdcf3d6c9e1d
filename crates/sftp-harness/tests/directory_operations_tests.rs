//! Directory operation tests: listdir/mkdir/rmdir against the real handler.

use sftp_harness::{Error, FileOperationHandler, OpenFlags};
use tempfile::TempDir;

fn new_handler() -> (FileOperationHandler, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let handler = FileOperationHandler::new(temp_dir.path());
    (handler, temp_dir)
}

async fn collect_names(handler: &FileOperationHandler, path: &str) -> Vec<String> {
    let mut entries = handler.listdir(path).await.unwrap();
    let mut names = Vec::new();
    while let Some((name, _attrs)) = entries.next_entry().await.unwrap() {
        names.push(name);
    }
    names.sort();
    names
}

#[tokio::test]
async fn test_listdir_on_empty_root_yields_nothing() {
    let (handler, _root) = new_handler();
    assert!(collect_names(&handler, "").await.is_empty());
}

#[tokio::test]
async fn test_listdir_after_mkdir_yields_single_entry() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("sub", None).await.unwrap();

    let mut entries = handler.listdir("").await.unwrap();
    let (name, attrs) = entries.next_entry().await.unwrap().unwrap();
    assert_eq!(name, "sub");
    assert!(attrs.is_dir());
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_listdir_multiple_entries() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("dir", None).await.unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
        let handle = handler.open(name, flags).await.unwrap();
        handler.close(handle).await.unwrap();
    }

    let names = collect_names(&handler, "").await;
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "dir"]);
}

#[tokio::test]
async fn test_listdir_is_not_restartable() {
    let (mut handler, _root) = new_handler();
    handler.mkdir("sub", None).await.unwrap();

    let mut entries = handler.listdir("").await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_some());
    assert!(entries.next_entry().await.unwrap().is_none());

    // exhausted stays exhausted
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_listdir_missing_path_fails() {
    let (handler, _root) = new_handler();
    let err = handler.listdir("missing").await.unwrap_err();
    assert!(matches!(err, Error::NoSuchFile(_)));
}

#[tokio::test]
async fn test_listdir_on_file_fails() {
    let (mut handler, _root) = new_handler();

    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();
    handler.close(handle).await.unwrap();

    let err = handler.listdir("f.txt").await.unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));
}

#[tokio::test]
async fn test_mkdir_existing_fails() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("sub", None).await.unwrap();
    let err = handler.mkdir("sub", None).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_mkdir_applies_mode() {
    use std::os::unix::fs::PermissionsExt;

    let (mut handler, root) = new_handler();
    handler.mkdir("locked", Some(0o700)).await.unwrap();

    let mode = std::fs::metadata(root.path().join("locked"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[tokio::test]
async fn test_rmdir_removes_empty_directory() {
    let (mut handler, root) = new_handler();

    handler.mkdir("sub", None).await.unwrap();
    handler.rmdir("sub").await.unwrap();
    assert!(!root.path().join("sub").exists());
}

#[tokio::test]
async fn test_rmdir_missing_fails() {
    let (mut handler, _root) = new_handler();
    let err = handler.rmdir("missing").await.unwrap_err();
    assert!(matches!(err, Error::NoSuchFile(_)));
}

#[tokio::test]
async fn test_rmdir_non_empty_fails() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("sub", None).await.unwrap();
    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("sub/f.txt", flags).await.unwrap();
    handler.close(handle).await.unwrap();

    let err = handler.rmdir("sub").await.unwrap_err();
    assert!(matches!(err, Error::DirectoryNotEmpty(_)));
}

#[tokio::test]
async fn test_nested_directories() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("a", None).await.unwrap();
    handler.mkdir("a/b", None).await.unwrap();
    handler.mkdir("a/b/c", None).await.unwrap();

    assert_eq!(collect_names(&handler, "a").await, vec!["b"]);
    assert_eq!(collect_names(&handler, "a/b").await, vec!["c"]);
    assert!(collect_names(&handler, "a/b/c").await.is_empty());
}

#[tokio::test]
async fn test_rename_directory() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("old", None).await.unwrap();
    handler.rename("old", "new").await.unwrap();

    assert!(handler.stat("new").await.unwrap().is_dir());
    assert!(matches!(
        handler.stat("old").await.unwrap_err(),
        Error::NoSuchFile(_)
    ));
}
