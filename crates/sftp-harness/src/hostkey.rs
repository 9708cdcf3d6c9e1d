//! Host identity key handling.
//!
//! The key file is reused across runs: load it when present, otherwise
//! generate an Ed25519 key and persist it PEM-encoded with owner-only
//! permissions so the same fixture identity survives restarts.

use crate::{Error, Result};
use russh_keys::key;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Load the host key from `path`, generating and saving one when missing.
pub async fn load_or_generate(path: &Path) -> Result<key::KeyPair> {
    if path.exists() {
        let key_data = fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("failed to read host key: {e}")))?;
        debug!("loaded host key from {:?}", path);
        return russh_keys::decode_secret_key(&key_data, None)
            .map_err(|e| Error::Config(format!("failed to parse host key: {e}")));
    }

    let key_pair = key::KeyPair::generate_ed25519()
        .ok_or_else(|| Error::Config("failed to generate host key".to_string()))?;
    write_key_file(path, &key_pair)?;
    info!("generated host key at {:?}", path);
    Ok(key_pair)
}

fn write_key_file(path: &Path, key_pair: &key::KeyPair) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create key directory: {e}")))?;
        }
    }

    let file = std::fs::File::create(path)
        .map_err(|e| Error::Config(format!("failed to create key file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Config(format!("failed to restrict key file: {e}")))?;
    }

    russh_keys::encode_pkcs8_pem(key_pair, &file)
        .map_err(|e| Error::Config(format!("failed to write host key: {e}")))
}
