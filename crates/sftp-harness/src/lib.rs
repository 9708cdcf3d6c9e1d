//! # sftp-harness
//!
//! A local SFTP server for testing file-transfer client code without a real
//! remote host.
//!
//! The SSH handshake, key exchange, and SFTP wire protocol are delegated to
//! `russh` and `russh-sftp`; this crate owns the filesystem-backed request
//! handler that maps SFTP operations onto a rooted local directory, plus the
//! lifecycle glue around it: bind with an ephemeral port, generated host
//! key, optional owned temp-directory root, and stop-on-drop release.
//!
//! ## Usage
//!
//! ```no_run
//! use sftp_harness::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> sftp_harness::Result<()> {
//!     let mut server = Server::bind(Config::default()).await?;
//!     server.start()?;
//!
//!     println!("sftp://{}", server.local_addr());
//!     println!("host key: {:?}", server.host_key_path());
//!     // ... point the client under test at it; any credentials work ...
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod attrs;
pub mod config;
pub mod error;
pub mod handler;
pub mod hostkey;
pub mod server;
pub mod session;

pub use attrs::AttributeRecord;
pub use config::{Config, LogFormat, LoggingConfig};
pub use error::{Error, Result};
pub use handler::{DirEntries, FileOperationHandler, HandleId, OpenFlags};
pub use server::Server;
pub use session::SftpSession;
