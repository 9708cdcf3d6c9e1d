//! Attribute tests: stat/lstat/fstat and attribute changes.

use sftp_harness::{AttributeRecord, FileOperationHandler, OpenFlags};
use tempfile::TempDir;

fn new_handler() -> (FileOperationHandler, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let handler = FileOperationHandler::new(temp_dir.path());
    (handler, temp_dir)
}

#[tokio::test]
async fn test_stat_size_after_write() {
    let (mut handler, _root) = new_handler();

    handler.mkdir("a", None).await.unwrap();
    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("a/f.txt", flags).await.unwrap();
    handler.write(handle, 0, b"hi").await.unwrap();
    handler.close(handle).await.unwrap();

    assert_eq!(handler.stat("a/f.txt").await.unwrap().size, Some(2));
}

#[tokio::test]
async fn test_fstat_matches_stat() {
    let (mut handler, _root) = new_handler();

    let flags = OpenFlags(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();
    handler.write(handle, 0, b"four").await.unwrap();

    let by_handle = handler.fstat(handle).await.unwrap();
    handler.close(handle).await.unwrap();
    let by_path = handler.stat("f.txt").await.unwrap();

    assert_eq!(by_handle.size, Some(4));
    assert_eq!(by_handle.size, by_path.size);
    assert_eq!(by_handle.permissions, by_path.permissions);
}

#[tokio::test]
async fn test_stat_reports_directories() {
    let (mut handler, _root) = new_handler();

    assert!(handler.stat("").await.unwrap().is_dir());

    handler.mkdir("sub", None).await.unwrap();
    assert!(handler.stat("sub").await.unwrap().is_dir());

    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();
    handler.close(handle).await.unwrap();
    assert!(!handler.stat("f.txt").await.unwrap().is_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn test_stat_reports_real_times_and_ownership() {
    let (mut handler, _root) = new_handler();

    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();
    handler.close(handle).await.unwrap();

    let attrs = handler.stat("f.txt").await.unwrap();
    assert!(attrs.mtime.is_some());
    assert!(attrs.atime.is_some());
    assert!(attrs.uid.is_some());
    assert!(attrs.gid.is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn test_setstat_applies_permissions() {
    let (mut handler, _root) = new_handler();

    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();
    handler.close(handle).await.unwrap();

    let attrs = AttributeRecord {
        permissions: Some(0o600),
        ..Default::default()
    };
    handler.setstat("f.txt", &attrs).await.unwrap();

    let mode = handler.stat("f.txt").await.unwrap().permissions.unwrap();
    assert_eq!(mode & 0o777, 0o600);
}

#[cfg(unix)]
#[tokio::test]
async fn test_fsetstat_applies_permissions_by_handle() {
    let (mut handler, _root) = new_handler();

    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();

    let attrs = AttributeRecord {
        permissions: Some(0o640),
        ..Default::default()
    };
    handler.fsetstat(handle, &attrs).await.unwrap();
    handler.close(handle).await.unwrap();

    let mode = handler.stat("f.txt").await.unwrap().permissions.unwrap();
    assert_eq!(mode & 0o777, 0o640);
}

#[tokio::test]
async fn test_setstat_accepts_and_ignores_timestamps() {
    let (mut handler, _root) = new_handler();

    let flags = OpenFlags(OpenFlags::WRITE | OpenFlags::CREATE);
    let handle = handler.open("f.txt", flags).await.unwrap();
    handler.close(handle).await.unwrap();

    let attrs = AttributeRecord {
        mtime: Some(0),
        atime: Some(0),
        ..Default::default()
    };
    handler.setstat("f.txt", &attrs).await.unwrap();
}
