//! Filesystem-backed request handler.
//!
//! `FileOperationHandler` services SFTP-style operations with POSIX-like
//! semantics, confined to a root directory. It has no dependency on the
//! transport: the session layer hands it decoded requests and encodes the
//! typed results or failures it returns.
//!
//! Each session owns one handler; requests are serviced strictly in arrival
//! order, so the handle table needs no locking.

use crate::attrs::AttributeRecord;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Upper bound on concurrently open handles within a session
const MAX_OPEN_HANDLES: usize = 1024;

/// Opaque identifier for an open file within a session.
///
/// Ids are allocated from a monotonic counter, so an id is never reused
/// while the client could still reference it in the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HandleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>()
            .map(HandleId)
            .map_err(|_| Error::invalid_handle("malformed handle identifier"))
    }
}

/// File open flags, protocol-level bit assignments
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const READ: u32 = 0x00000001;
    pub const WRITE: u32 = 0x00000002;
    pub const APPEND: u32 = 0x00000004;
    pub const CREATE: u32 = 0x00000008;
    pub const TRUNCATE: u32 = 0x00000010;
    pub const EXCLUSIVE: u32 = 0x00000020;

    pub fn has_read(&self) -> bool {
        self.0 & Self::READ != 0
    }

    pub fn has_write(&self) -> bool {
        self.0 & Self::WRITE != 0
    }

    pub fn has_append(&self) -> bool {
        self.0 & Self::APPEND != 0
    }

    pub fn has_create(&self) -> bool {
        self.0 & Self::CREATE != 0
    }

    pub fn has_truncate(&self) -> bool {
        self.0 & Self::TRUNCATE != 0
    }

    pub fn has_exclusive(&self) -> bool {
        self.0 & Self::EXCLUSIVE != 0
    }
}

/// One client-opened file, owned exclusively by the handle table
struct OpenFileHandle {
    file: fs::File,
    flags: OpenFlags,
    /// Resolved local path, kept for attribute changes by handle
    path: PathBuf,
    /// Client-visible path, kept for error messages
    client_path: String,
}

/// Lazy directory listing.
///
/// Finite and not restartable: once `next_entry` returns `None` the
/// sequence is exhausted.
pub struct DirEntries {
    inner: fs::ReadDir,
    client_path: String,
}

impl DirEntries {
    /// Produce the next `(name, attributes)` pair, or `None` at the end.
    ///
    /// Entry attributes come from `lstat`, so symlinked children report
    /// themselves rather than their targets. Entries whose metadata cannot
    /// be read (deleted mid-listing) are skipped.
    pub async fn next_entry(&mut self) -> Result<Option<(String, AttributeRecord)>> {
        loop {
            let entry = self
                .inner
                .next_entry()
                .await
                .map_err(|e| Error::from_io(&self.client_path, e))?;

            let Some(entry) = entry else {
                return Ok(None);
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            match fs::symlink_metadata(entry.path()).await {
                Ok(metadata) => return Ok(Some((name, AttributeRecord::from(&metadata)))),
                Err(e) => {
                    debug!("skipping unreadable directory entry {:?}: {}", name, e);
                }
            }
        }
    }
}

/// Maps SFTP-style requests onto a rooted local filesystem
pub struct FileOperationHandler {
    root: PathBuf,
    handles: HashMap<HandleId, OpenFileHandle>,
    next_handle_id: u32,
}

impl FileOperationHandler {
    /// Create a handler rooted at `root`.
    ///
    /// The root must be an absolute path to an existing directory; the
    /// server validates this before sessions are created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handles: HashMap::new(),
            next_handle_id: 0,
        }
    }

    /// The jail directory this handler is confined to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of currently open handles
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Resolve a client-supplied path against the root.
    ///
    /// `.` and `..` segments are normalized lexically before joining, and a
    /// path whose normalized form would leave the root fails with
    /// `PermissionDenied`. The returned error never carries the resolved
    /// local path, only the client's input.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let components = normalize_components(path)?;

        let mut resolved = self.root.clone();
        for component in components {
            resolved.push(component);
        }
        Ok(resolved)
    }

    /// Normalize a client path to its client-absolute form, e.g. for
    /// answering `realpath` requests. The root is reported as `/`.
    pub fn realpath(&self, path: &str) -> Result<String> {
        let components = normalize_components(path)?;
        if components.is_empty() {
            Ok("/".to_string())
        } else {
            Ok(format!("/{}", components.join("/")))
        }
    }

    /// Open a file, creating an entry in the handle table.
    pub async fn open(&mut self, path: &str, flags: OpenFlags) -> Result<HandleId> {
        let resolved = self.resolve(path)?;

        if self.handles.len() >= MAX_OPEN_HANDLES {
            warn!("maximum open handles reached ({})", MAX_OPEN_HANDLES);
            return Err(Error::resource_exhausted("too many open file handles"));
        }

        let mut options = fs::OpenOptions::new();
        if flags.has_read() {
            options.read(true);
        }
        if flags.has_write() {
            options.write(true);
        }
        if flags.has_append() {
            options.append(true);
        }
        if flags.has_create() {
            options.create(true);
        }
        if flags.has_truncate() {
            options.truncate(true);
        }
        if flags.has_exclusive() {
            options.create_new(true);
        }
        if !flags.has_read() && !flags.has_write() {
            // a pflags of zero is a plain read in practice
            options.read(true);
        }

        let file = options
            .open(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;

        let id = HandleId(self.next_handle_id);
        self.next_handle_id += 1;
        self.handles.insert(
            id,
            OpenFileHandle {
                file,
                flags,
                path: resolved,
                client_path: path.to_string(),
            },
        );

        debug!("opened {:?} as handle {} (flags {:#x})", path, id, flags.0);
        Ok(id)
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns fewer bytes than requested at end-of-file and an empty
    /// buffer exactly at end-of-file; neither is an error.
    pub async fn read(&mut self, handle: HandleId, offset: u64, len: u32) -> Result<Vec<u8>> {
        let entry = self
            .handles
            .get_mut(&handle)
            .ok_or_else(|| Error::invalid_handle("handle does not exist or is closed"))?;
        let client_path = entry.client_path.clone();

        entry
            .file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::from_io(&client_path, e))?;

        let mut buffer = vec![0u8; len as usize];
        let mut filled = 0;
        while filled < buffer.len() {
            let n = entry
                .file
                .read(&mut buffer[filled..])
                .await
                .map_err(|e| Error::from_io(&client_path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buffer.truncate(filled);

        Ok(buffer)
    }

    /// Write `data` at `offset`, regardless of the handle's current cursor.
    ///
    /// Requests are offset-explicit, not stream-sequential. A handle opened
    /// for append writes at end-of-file as the flag dictates.
    pub async fn write(&mut self, handle: HandleId, offset: u64, data: &[u8]) -> Result<()> {
        let entry = self
            .handles
            .get_mut(&handle)
            .ok_or_else(|| Error::invalid_handle("handle does not exist or is closed"))?;
        let client_path = entry.client_path.clone();

        if !entry.flags.has_append() {
            entry
                .file
                .seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(|e| Error::from_io(&client_path, e))?;
        }

        entry
            .file
            .write_all(data)
            .await
            .map_err(|e| Error::from_io(&client_path, e))?;

        Ok(())
    }

    /// Close a handle, removing its table entry.
    ///
    /// Close is terminal: a second close on the same id fails with
    /// `InvalidHandle`.
    pub async fn close(&mut self, handle: HandleId) -> Result<()> {
        let mut entry = self
            .handles
            .remove(&handle)
            .ok_or_else(|| Error::invalid_handle("handle does not exist or is closed"))?;

        // buffered writes settle before the descriptor is released
        entry
            .file
            .flush()
            .await
            .map_err(|e| Error::from_io(&entry.client_path, e))?;

        debug!("closed handle {} ({:?})", handle, entry.client_path);
        Ok(())
    }

    /// Attributes for a path, following a final symlink.
    pub async fn stat(&self, path: &str) -> Result<AttributeRecord> {
        let resolved = self.resolve(path)?;
        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        Ok(AttributeRecord::from(&metadata))
    }

    /// Attributes for a path without following a final symlink.
    pub async fn lstat(&self, path: &str) -> Result<AttributeRecord> {
        let resolved = self.resolve(path)?;
        let metadata = fs::symlink_metadata(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        Ok(AttributeRecord::from(&metadata))
    }

    /// Attributes for an open handle.
    pub async fn fstat(&self, handle: HandleId) -> Result<AttributeRecord> {
        let entry = self
            .handles
            .get(&handle)
            .ok_or_else(|| Error::invalid_handle("handle does not exist or is closed"))?;
        let metadata = entry
            .file
            .metadata()
            .await
            .map_err(|e| Error::from_io(&entry.client_path, e))?;
        Ok(AttributeRecord::from(&metadata))
    }

    /// Apply attribute changes to a path.
    pub async fn setstat(&self, path: &str, attrs: &AttributeRecord) -> Result<()> {
        let resolved = self.resolve(path)?;
        self.apply_attrs(&resolved, path, attrs).await
    }

    /// Apply attribute changes through an open handle.
    pub async fn fsetstat(&self, handle: HandleId, attrs: &AttributeRecord) -> Result<()> {
        let entry = self
            .handles
            .get(&handle)
            .ok_or_else(|| Error::invalid_handle("handle does not exist or is closed"))?;
        let (path, client_path) = (entry.path.clone(), entry.client_path.clone());
        self.apply_attrs(&path, &client_path, attrs).await
    }

    /// List the immediate children of a directory.
    pub async fn listdir(&self, path: &str) -> Result<DirEntries> {
        let resolved = self.resolve(path)?;

        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }

        let inner = fs::read_dir(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;

        Ok(DirEntries {
            inner,
            client_path: path.to_string(),
        })
    }

    /// Create a directory, applying `mode` when given.
    pub async fn mkdir(&mut self, path: &str, mode: Option<u32>) -> Result<()> {
        let resolved = self.resolve(path)?;
        fs::create_dir(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;

        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(mode & 0o7777);
            fs::set_permissions(&resolved, perms)
                .await
                .map_err(|e| Error::from_io(path, e))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        debug!("created directory {:?}", path);
        Ok(())
    }

    /// Remove an empty directory.
    pub async fn rmdir(&mut self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        fs::remove_dir(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        debug!("removed directory {:?}", path);
        Ok(())
    }

    /// Remove a file.
    pub async fn remove(&mut self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        fs::remove_file(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;
        debug!("removed file {:?}", path);
        Ok(())
    }

    /// Rename `old` to `new`.
    ///
    /// The destination must not exist; renaming onto an existing path fails
    /// with `AlreadyExists` rather than overwriting.
    pub async fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let old_resolved = self.resolve(old)?;
        let new_resolved = self.resolve(new)?;

        if fs::symlink_metadata(&old_resolved).await.is_err() {
            return Err(Error::NoSuchFile(old.to_string()));
        }
        if fs::symlink_metadata(&new_resolved).await.is_ok() {
            return Err(Error::AlreadyExists(new.to_string()));
        }

        fs::rename(&old_resolved, &new_resolved)
            .await
            .map_err(|e| Error::from_io(old, e))?;
        debug!("renamed {:?} to {:?}", old, new);
        Ok(())
    }

    /// Create a symbolic link at `link` pointing to `target`.
    ///
    /// A client-absolute target is re-rooted under the jail; a relative
    /// target is stored as-is after checking that it cannot lead out of the
    /// jail from the link's directory.
    #[cfg(unix)]
    pub async fn symlink(&mut self, target: &str, link: &str) -> Result<()> {
        let link_resolved = self.resolve(link)?;

        let local_target = if target.starts_with('/') {
            self.resolve(target)?
        } else {
            let mut scope = normalize_components(link)?;
            scope.pop();
            for segment in target.split('/') {
                match segment {
                    "" | "." => {}
                    ".." => {
                        if scope.pop().is_none() {
                            warn!("symlink target escapes the root: {:?}", target);
                            return Err(Error::PermissionDenied(target.to_string()));
                        }
                    }
                    other => scope.push(other.to_string()),
                }
            }
            PathBuf::from(target)
        };

        fs::symlink(&local_target, &link_resolved)
            .await
            .map_err(|e| Error::from_io(link, e))?;
        debug!("created symlink {:?} -> {:?}", link, target);
        Ok(())
    }

    /// Create a symbolic link (unsupported on this platform).
    #[cfg(not(unix))]
    pub async fn symlink(&mut self, _target: &str, _link: &str) -> Result<()> {
        Err(Error::Io(std::io::Error::from(
            std::io::ErrorKind::Unsupported,
        )))
    }

    /// Read a symbolic link's target, translated back to the client view.
    ///
    /// An absolute local target inside the root is reported relative to it;
    /// a target outside the root is refused.
    pub async fn readlink(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        let target = fs::read_link(&resolved)
            .await
            .map_err(|e| Error::from_io(path, e))?;

        if target.is_absolute() {
            match target.strip_prefix(&self.root) {
                Ok(rel) if rel.as_os_str().is_empty() => Ok("/".to_string()),
                Ok(rel) => Ok(format!("/{}", rel.display())),
                Err(_) => {
                    warn!("symlink {:?} points outside the root", path);
                    Err(Error::PermissionDenied(path.to_string()))
                }
            }
        } else {
            Ok(target.to_string_lossy().into_owned())
        }
    }

    async fn apply_attrs(
        &self,
        resolved: &Path,
        client_path: &str,
        attrs: &AttributeRecord,
    ) -> Result<()> {
        #[cfg(unix)]
        if let Some(mode) = attrs.permissions {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(mode & 0o7777);
            fs::set_permissions(resolved, perms)
                .await
                .map_err(|e| Error::from_io(client_path, e))?;
            debug!("set permissions {:o} on {:?}", mode & 0o7777, client_path);
        }
        #[cfg(not(unix))]
        let _ = (resolved, client_path);

        if attrs.atime.is_some() || attrs.mtime.is_some() {
            // timestamp changes are accepted and ignored
            debug!("ignoring timestamp change on {:?}", client_path);
        }

        Ok(())
    }
}

impl Drop for FileOperationHandler {
    /// Force-close anything the client left open when the session ends.
    fn drop(&mut self) {
        let open = self.handles.len();
        if open > 0 {
            debug!("force-closing {} open handles on session end", open);
            self.handles.clear();
        }
    }
}

/// Lexically normalize a client path into its segments.
///
/// Any failure here, including traversal out of the root and embedded null
/// bytes, is `PermissionDenied` carrying only the client's input.
fn normalize_components(path: &str) -> Result<Vec<String>> {
    if path.contains('\0') {
        warn!("path contains null byte");
        return Err(Error::PermissionDenied(path.replace('\0', "\\0")));
    }

    let mut components: Vec<String> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    warn!("path traversal attempt: {:?}", path);
                    return Err(Error::PermissionDenied(path.to_string()));
                }
            }
            other => components.push(other.to_string()),
        }
    }
    Ok(components)
}
