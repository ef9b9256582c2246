//! Local age identity

use std::path::Path;
use std::str::FromStr;

use age::x25519;
use chartcrypt_core::{CryptError, CryptResult};
use secrecy::{ExposeSecret, SecretString};

use crate::atomic::atomic_replace;

/// The user's X25519 keypair. Only the public half ever leaves the machine.
pub struct LocalIdentity {
    inner: x25519::Identity,
}

impl LocalIdentity {
    pub fn generate() -> Self {
        Self {
            inner: x25519::Identity::generate(),
        }
    }

    /// Parse identity file text: `#` comments and blank lines are skipped,
    /// the first remaining line must be an `AGE-SECRET-KEY-1...` string.
    pub fn parse(text: &str) -> CryptResult<Self> {
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .ok_or_else(|| CryptError::Identity("identity file holds no key".into()))?;

        let inner = x25519::Identity::from_str(line)
            .map_err(|e| CryptError::Identity(format!("invalid age identity: {e}")))?;
        Ok(Self { inner })
    }

    /// `None` when no identity file exists yet.
    pub async fn load(path: &Path) -> CryptResult<Option<Self>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => SecretString::from(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CryptError::file(path, e)),
        };
        Self::parse(text.expose_secret()).map(Some)
    }

    /// Write in age-keygen layout, owner-only.
    pub async fn save(&self, path: &Path) -> CryptResult<()> {
        let contents = SecretString::from(format!(
            "# public key: {}\n{}\n",
            self.public_key(),
            self.inner.to_string().expose_secret()
        ));
        atomic_replace(path, contents.expose_secret().as_bytes(), true).await?;
        tracing::info!(path = %path.display(), public_key = %self.public_key(), "saved age identity");
        Ok(())
    }

    /// `age1...`
    pub fn public_key(&self) -> String {
        self.inner.to_public().to_string()
    }

    pub fn as_age(&self) -> &x25519::Identity {
        &self.inner
    }
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}
