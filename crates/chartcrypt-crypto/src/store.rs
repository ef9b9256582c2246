//! Local key file management
//!
//! The key file is re-read on every call. Writes go to a sibling temp file
//! first and are then moved into place, so a concurrent reader sees either
//! the old record or the new one, never a partial write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chartcrypt_core::{CryptError, CryptResult};

use crate::key::SymmetricKey;
use crate::record::KeyRecord;

#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the current record, or `None` if no key file exists yet.
    pub fn load(&self) -> CryptResult<Option<KeyRecord>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CryptError::file(&self.path, e)),
        };

        KeyRecord::parse_bytes(&content)
            .map(Some)
            .map_err(|e| match e {
                CryptError::KeyUnreadable(reason) => {
                    CryptError::KeyUnreadable(format!("{}: {reason}", self.path.display()))
                }
                other => other,
            })
    }

    /// Load the record, generating and persisting a new random key on first use.
    pub fn materialize(&self) -> CryptResult<KeyRecord> {
        if let Some(record) = self.load()? {
            tracing::debug!(path = %self.path.display(), id = %record.id(), "loaded key");
            return Ok(record);
        }

        let record = KeyRecord::generate();
        if self.persist_new(&record)? {
            tracing::info!(path = %self.path.display(), id = %record.id(), "generated new key");
            return Ok(record);
        }

        // Another process created the key between our read and write.
        self.load()?.ok_or_else(|| {
            CryptError::KeyUnreadable(format!("{} vanished after creation", self.path.display()))
        })
    }

    /// Convenience for the cipher: materialize and decode.
    pub fn symmetric_key(&self) -> CryptResult<SymmetricKey> {
        self.materialize()?.symmetric_key()
    }

    /// Parse an externally supplied record and overwrite the local key with it.
    pub fn import(&self, bytes: &[u8]) -> CryptResult<KeyRecord> {
        let record = KeyRecord::parse_bytes(bytes)?;
        self.persist(&record)?;
        tracing::info!(path = %self.path.display(), id = %record.id(), "imported key");
        Ok(record)
    }

    /// Portable representation of the current key.
    pub fn export(&self) -> CryptResult<String> {
        self.materialize()?.to_yaml()
    }

    /// Overwrite the key file with `record`.
    pub fn persist(&self, record: &KeyRecord) -> CryptResult<()> {
        let tmp = self.write_temp(record)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CryptError::file(&self.path, e)
        })
    }

    /// Create the key file only if it does not exist. Returns `false` if it already did.
    fn persist_new(&self, record: &KeyRecord) -> CryptResult<bool> {
        let tmp = self.write_temp(record)?;
        let linked = fs::hard_link(&tmp, &self.path);
        let _ = fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(CryptError::file(&self.path, e)),
        }
    }

    fn write_temp(&self, record: &KeyRecord) -> CryptResult<PathBuf> {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CryptError::file(parent, e))?;
        }

        let tmp = parent.join(format!(
            ".{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id()
        ));
        let yaml = record.to_yaml()?;

        let mut file = open_private(&tmp).map_err(|e| CryptError::file(&tmp, e))?;
        file.write_all(yaml.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| CryptError::file(&tmp, e))?;

        Ok(tmp)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
