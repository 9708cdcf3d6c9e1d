//! SFTP subsystem shim.
//!
//! `SftpSession` binds one `FileOperationHandler` to the subsystem framing
//! library: decoded requests come in through the handler trait, typed
//! results or failures go back out and are encoded as the corresponding
//! protocol responses. One instance is created per connection, so handle
//! tables are never shared across sessions.

use crate::attrs::AttributeRecord;
use crate::handler::{DirEntries, FileOperationHandler, HandleId, OpenFlags};
use crate::Error;
use async_trait::async_trait;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags as WireOpenFlags, Status,
    StatusCode, Version,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Directory listings drain in batches of this many entries per request
const READDIR_BATCH: usize = 100;

/// Per-connection SFTP session state
pub struct SftpSession {
    handler: FileOperationHandler,
    dirs: HashMap<String, DirEntries>,
    next_dir_id: u32,
}

impl SftpSession {
    /// Create a session rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            handler: FileOperationHandler::new(root),
            dirs: HashMap::new(),
            next_dir_id: 0,
        }
    }

    fn ok_status(id: u32) -> Status {
        Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "Ok".to_string(),
            language_tag: "en-US".to_string(),
        }
    }

    fn audit(op: &'static str, err: Error) -> Error {
        if err.is_security_event() {
            warn!("security event during {}: {}", op, err);
        }
        err
    }
}

#[async_trait]
impl russh_sftp::server::Handler for SftpSession {
    type Error = Error;

    fn unimplemented(&self) -> Self::Error {
        Error::NotSupported("operation not supported".to_string())
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        info!("sftp session initialized, client version {}", version);
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: WireOpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let flags = OpenFlags(pflags.bits());
        let handle = self
            .handler
            .open(&filename, flags)
            .await
            .map_err(|e| Self::audit("open", e))?;
        Ok(Handle {
            id,
            handle: handle.to_string(),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        if self.dirs.remove(&handle).is_some() {
            debug!("closed directory handle {}", handle);
            return Ok(Self::ok_status(id));
        }

        let handle: HandleId = handle.parse()?;
        self.handler.close(handle).await?;
        Ok(Self::ok_status(id))
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let handle: HandleId = handle.parse()?;
        let data = self.handler.read(handle, offset, len).await?;

        if data.is_empty() && len > 0 {
            return Err(Error::Eof);
        }
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let handle: HandleId = handle.parse()?;
        self.handler.write(handle, offset, &data).await?;
        Ok(Self::ok_status(id))
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let record = self
            .handler
            .lstat(&path)
            .await
            .map_err(|e| Self::audit("lstat", e))?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&record),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let handle: HandleId = handle.parse()?;
        let record = self.handler.fstat(handle).await?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&record),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let record = AttributeRecord::from(&attrs);
        self.handler
            .setstat(&path, &record)
            .await
            .map_err(|e| Self::audit("setstat", e))?;
        Ok(Self::ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let handle: HandleId = handle.parse()?;
        let record = AttributeRecord::from(&attrs);
        self.handler.fsetstat(handle, &record).await?;
        Ok(Self::ok_status(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let entries = self
            .handler
            .listdir(&path)
            .await
            .map_err(|e| Self::audit("opendir", e))?;

        let handle = format!("dir-{}", self.next_dir_id);
        self.next_dir_id += 1;
        self.dirs.insert(handle.clone(), entries);

        debug!("opened directory {:?} as handle {}", path, handle);
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let entries = self
            .dirs
            .get_mut(&handle)
            .ok_or_else(|| Error::invalid_handle("handle does not exist or is closed"))?;

        let mut files = Vec::new();
        while files.len() < READDIR_BATCH {
            match entries.next_entry().await? {
                Some((name, record)) => {
                    files.push(File::new(name, FileAttributes::from(&record)));
                }
                None => break,
            }
        }

        if files.is_empty() {
            return Err(Error::Eof);
        }
        Ok(Name { id, files })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        self.handler
            .remove(&filename)
            .await
            .map_err(|e| Self::audit("remove", e))?;
        Ok(Self::ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.handler
            .mkdir(&path, attrs.permissions)
            .await
            .map_err(|e| Self::audit("mkdir", e))?;
        Ok(Self::ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        self.handler
            .rmdir(&path)
            .await
            .map_err(|e| Self::audit("rmdir", e))?;
        Ok(Self::ok_status(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = self.handler.realpath(&path)?;
        Ok(Name {
            id,
            files: vec![File::dummy(resolved)],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let record = self
            .handler
            .stat(&path)
            .await
            .map_err(|e| Self::audit("stat", e))?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&record),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        self.handler
            .rename(&oldpath, &newpath)
            .await
            .map_err(|e| Self::audit("rename", e))?;
        Ok(Self::ok_status(id))
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let target = self
            .handler
            .readlink(&path)
            .await
            .map_err(|e| Self::audit("readlink", e))?;
        Ok(Name {
            id,
            files: vec![File::dummy(target)],
        })
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        self.handler
            .symlink(&targetpath, &linkpath)
            .await
            .map_err(|e| Self::audit("symlink", e))?;
        Ok(Self::ok_status(id))
    }
}
