//! Normalized file attributes.
//!
//! `AttributeRecord` is the handler's view of filesystem metadata, sitting
//! between the platform's native stat representation and the protocol-level
//! attribute encoding.

use russh_sftp::protocol::FileAttributes;

/// Normalized view of filesystem metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeRecord {
    /// File size in bytes
    pub size: Option<u64>,
    /// Owning user id (Unix only)
    pub uid: Option<u32>,
    /// Owning group id (Unix only)
    pub gid: Option<u32>,
    /// Permission bits, including the file-type bits from the mode
    pub permissions: Option<u32>,
    /// Access time, seconds since the epoch
    pub atime: Option<u32>,
    /// Modification time, seconds since the epoch
    pub mtime: Option<u32>,
}

impl AttributeRecord {
    /// Whether the record describes a directory
    pub fn is_dir(&self) -> bool {
        self.permissions
            .is_some_and(|mode| mode & 0o170000 == 0o040000)
    }
}

#[cfg(unix)]
impl From<&std::fs::Metadata> for AttributeRecord {
    fn from(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            size: Some(metadata.len()),
            uid: Some(metadata.uid()),
            gid: Some(metadata.gid()),
            permissions: Some(metadata.mode()),
            atime: u32::try_from(metadata.atime()).ok(),
            mtime: u32::try_from(metadata.mtime()).ok(),
        }
    }
}

#[cfg(not(unix))]
impl From<&std::fs::Metadata> for AttributeRecord {
    fn from(metadata: &std::fs::Metadata) -> Self {
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| u32::try_from(d.as_secs()).ok());

        Self {
            size: Some(metadata.len()),
            uid: None,
            gid: None,
            permissions: Some(if metadata.is_dir() { 0o040755 } else { 0o100644 }),
            atime: None,
            mtime,
        }
    }
}

impl From<&AttributeRecord> for FileAttributes {
    fn from(record: &AttributeRecord) -> Self {
        let mut attrs = FileAttributes::default();
        attrs.size = record.size;
        attrs.uid = record.uid;
        attrs.gid = record.gid;
        attrs.permissions = record.permissions;
        attrs.atime = record.atime;
        attrs.mtime = record.mtime;
        attrs
    }
}

impl From<&FileAttributes> for AttributeRecord {
    fn from(attrs: &FileAttributes) -> Self {
        Self {
            size: attrs.size,
            uid: attrs.uid,
            gid: attrs.gid,
            permissions: attrs.permissions,
            atime: attrs.atime,
            mtime: attrs.mtime,
        }
    }
}
