//! Error types for the harness and its file-operation handler.
//!
//! Every failure from a local filesystem call is caught at the handler
//! boundary and mapped to one of the typed kinds below; no raw OS error
//! escapes to the client. Jail-escape attempts surface as ordinary
//! `PermissionDenied` so the root boundary cannot be probed through error
//! messages.

use russh_sftp::protocol::StatusCode;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for SFTP-style file operations and server lifecycle
#[derive(Error, Debug)]
pub enum Error {
    /// Path does not exist (and the operation does not create it)
    #[error("no such file: {0}")]
    NoSuchFile(String),

    /// Destination already exists (exclusive create, mkdir, rename)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Access denied, including any path that resolves outside the root
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Directory operation on a non-directory
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// rmdir on a directory that still has entries
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Unknown or already-closed file handle
    #[error("invalid file handle: {0}")]
    InvalidHandle(String),

    /// Generic local I/O failure not covered by a more specific kind
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// End of file or directory listing; protocol-level signal, not a failure
    #[error("end of file")]
    Eof,

    /// Operation the server does not implement
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Handle table is full
    #[error("resource exhaustion: {0}")]
    ResourceExhausted(String),

    /// SSH transport error
    #[error("SSH error: {0}")]
    Ssh(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Listener or connection failure
    #[error("connection error: {0}")]
    Connection(String),
}

impl Error {
    /// Map a local I/O failure to the typed taxonomy.
    ///
    /// `path` is the client-visible path, never the resolved local one, so
    /// the message is safe to hand to the transport.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Error::NoSuchFile(path.to_string()),
            ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
            ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_string()),
            ErrorKind::NotADirectory => Error::NotADirectory(path.to_string()),
            ErrorKind::DirectoryNotEmpty => Error::DirectoryNotEmpty(path.to_string()),
            _ => Error::Io(err),
        }
    }

    /// Check if error should be audited as a security event
    pub fn is_security_event(&self) -> bool {
        matches!(self, Error::PermissionDenied(_))
    }

    /// Get the SFTP status code corresponding to this error
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            Error::NoSuchFile(_) => StatusCode::NoSuchFile,
            Error::PermissionDenied(_) => StatusCode::PermissionDenied,
            Error::InvalidHandle(_) => StatusCode::BadMessage,
            Error::Eof => StatusCode::Eof,
            Error::NotSupported(_) => StatusCode::OpUnsupported,
            Error::AlreadyExists(_)
            | Error::NotADirectory(_)
            | Error::DirectoryNotEmpty(_)
            | Error::Io(_)
            | Error::ResourceExhausted(_) => StatusCode::Failure,
            Error::Ssh(_) | Error::Connection(_) => StatusCode::ConnectionLost,
            Error::Config(_) => StatusCode::Failure,
        }
    }

    /// Get the error message safe to send to the client.
    ///
    /// `PermissionDenied` and configuration failures are collapsed to fixed
    /// strings; the remaining kinds only ever carry client-visible paths.
    pub fn sanitized_message(&self) -> String {
        match self {
            Error::PermissionDenied(_) => "Permission denied".to_string(),
            Error::Config(_) => "Server configuration error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Create invalid handle error
    pub fn invalid_handle(context: impl Into<String>) -> Self {
        Error::InvalidHandle(context.into())
    }

    /// Create resource exhaustion error
    pub fn resource_exhausted(context: impl Into<String>) -> Self {
        Error::ResourceExhausted(context.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

impl From<russh_keys::Error> for Error {
    fn from(err: russh_keys::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

impl From<Error> for StatusCode {
    fn from(err: Error) -> Self {
        err.to_status_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_from_io_kind_mapping() {
        let err = Error::from_io("a.txt", std::io::Error::from(ErrorKind::NotFound));
        assert!(matches!(err, Error::NoSuchFile(_)));

        let err = Error::from_io("a.txt", std::io::Error::from(ErrorKind::AlreadyExists));
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = Error::from_io("a.txt", std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::PermissionDenied(_)));

        let err = Error::from_io("a.txt", std::io::Error::from(ErrorKind::NotADirectory));
        assert!(matches!(err, Error::NotADirectory(_)));

        let err = Error::from_io("a.txt", std::io::Error::from(ErrorKind::DirectoryNotEmpty));
        assert!(matches!(err, Error::DirectoryNotEmpty(_)));

        let err = Error::from_io("a.txt", std::io::Error::from(ErrorKind::TimedOut));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_to_status_code() {
        assert_eq!(
            Error::NoSuchFile("test".into()).to_status_code(),
            StatusCode::NoSuchFile
        );
        assert_eq!(
            Error::PermissionDenied("test".into()).to_status_code(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            Error::InvalidHandle("test".into()).to_status_code(),
            StatusCode::BadMessage
        );
        assert_eq!(
            Error::DirectoryNotEmpty("test".into()).to_status_code(),
            StatusCode::Failure
        );
        assert_eq!(Error::Eof.to_status_code(), StatusCode::Eof);
        assert_eq!(
            Error::NotSupported("test".into()).to_status_code(),
            StatusCode::OpUnsupported
        );
    }

    #[test]
    fn test_is_security_event() {
        assert!(Error::PermissionDenied("test".into()).is_security_event());
        assert!(!Error::NoSuchFile("test".into()).is_security_event());
        assert!(!Error::InvalidHandle("test".into()).is_security_event());
    }

    #[test]
    fn test_sanitized_message() {
        let perm_err = Error::PermissionDenied("../../etc/shadow".into());
        assert_eq!(perm_err.sanitized_message(), "Permission denied");

        let config_err = Error::Config("missing host key at /secure/path".into());
        assert_eq!(config_err.sanitized_message(), "Server configuration error");

        let missing = Error::NoSuchFile("a.txt".into());
        assert_eq!(missing.sanitized_message(), "no such file: a.txt");
    }
}
