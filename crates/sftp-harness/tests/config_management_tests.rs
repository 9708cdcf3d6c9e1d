//! Configuration tests: defaults, TOML loading, validation.

use sftp_harness::{Config, Error, LogFormat};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.port, 0);
    assert!(config.root_dir.is_none());
    assert_eq!(config.backlog, 10);
    assert_eq!(config.timeout, 300);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Text);
}

#[test]
fn test_from_file_full() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
bind_address = "0.0.0.0"
port = 2222
backlog = 50
timeout = 60

[logging]
level = "debug"
format = "json"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.port, 2222);
    assert_eq!(config.backlog, 50);
    assert_eq!(config.timeout, 60);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.root_dir.is_none());
}

#[test]
fn test_from_file_empty_uses_defaults() {
    let file = NamedTempFile::new().unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.port, 0);
}

#[test]
fn test_from_file_missing_is_a_config_error() {
    let err = Config::from_file("/nonexistent/harness.toml").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_from_file_invalid_toml_is_a_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "this is not toml [").unwrap();

    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_validate_accepts_unset_root() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_missing_root() {
    let mut config = Config::default();
    config.root_dir = Some("/nonexistent/sftp-root".into());

    let err = config.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_validate_rejects_file_as_root() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("not-a-dir");
    std::fs::write(&file_path, b"x").unwrap();

    let mut config = Config::default();
    config.root_dir = Some(file_path);

    let err = config.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_validate_accepts_existing_root() {
    let temp_dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.root_dir = Some(temp_dir.path().to_path_buf());
    assert!(config.validate().is_ok());
}
