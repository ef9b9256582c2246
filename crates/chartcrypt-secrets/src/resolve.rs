//! Which key the filters use
//!
//! 1. the local key file, if present
//! 2. else the repository envelope, if one encloses the working directory and
//!    a local identity exists (the unwrapped key is not written to disk)
//! 3. else a freshly generated local key

use std::path::PathBuf;

use chartcrypt_core::CryptResult;
use chartcrypt_crypto::{is_encrypted, KeyRecord, KeyStore, SymmetricKey};

use crate::envelope::RepoEnvelope;
use crate::identity::LocalIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    LocalFile(PathBuf),
    /// Path of the `key.age` that was unwrapped.
    Envelope(PathBuf),
    Generated(PathBuf),
}

#[derive(Debug, Clone)]
pub struct KeyResolver {
    store: KeyStore,
    identity_path: PathBuf,
    start: PathBuf,
}

impl KeyResolver {
    /// `start` is where the upward search for an envelope begins, normally the cwd.
    pub fn new(store: KeyStore, identity_path: PathBuf, start: PathBuf) -> Self {
        Self {
            store,
            identity_path,
            start,
        }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub async fn resolve(&self) -> CryptResult<(KeyRecord, KeySource)> {
        if let Some(record) = self.store.load()? {
            return Ok((record, KeySource::LocalFile(self.store.path().to_path_buf())));
        }

        if let Some(envelope) = RepoEnvelope::find(&self.start) {
            if let Some(identity) = LocalIdentity::load(&self.identity_path).await? {
                let record = envelope.unwrap_key(&identity).await?;
                tracing::debug!(
                    envelope = %envelope.envelope_path().display(),
                    id = %record.id(),
                    "using key from repository envelope"
                );
                return Ok((record, KeySource::Envelope(envelope.envelope_path())));
            }
        }

        let record = self.store.materialize()?;
        Ok((record, KeySource::Generated(self.store.path().to_path_buf())))
    }

    pub async fn symmetric_key(&self) -> CryptResult<SymmetricKey> {
        self.resolve().await?.0.symmetric_key()
    }

    /// Portable record of whichever key the filters would use.
    ///
    /// An envelope-derived key is printed, never written to the local key file.
    pub async fn export(&self) -> CryptResult<String> {
        self.resolve().await?.0.to_yaml()
    }

    /// Clean filter: already-encrypted input is returned without resolving a key.
    pub async fn seal(&self, input: Vec<u8>) -> CryptResult<Vec<u8>> {
        let key = if is_encrypted(&input) {
            None
        } else {
            Some(self.symmetric_key().await?)
        };
        chartcrypt_crypto::seal(input, || key.ok_or_else(unreachable_key))
    }

    /// Smudge filter: plaintext input is returned without resolving a key.
    pub async fn open(&self, input: Vec<u8>) -> CryptResult<Vec<u8>> {
        let key = if is_encrypted(&input) {
            Some(self.symmetric_key().await?)
        } else {
            None
        };
        chartcrypt_crypto::open(input, || key.ok_or_else(unreachable_key))
    }
}

fn unreachable_key() -> chartcrypt_core::CryptError {
    chartcrypt_core::CryptError::KeyUnreadable("key was not resolved for this payload".into())
}
