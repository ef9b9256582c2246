//! Portable key representation used by the key file, `export`, `import`,
//! and cluster recovery.
//!
//! ```yaml
//! key: gKNJBnflqQA6lfUKLWMwl7CMJk4j+qqG9jnGYdTvwTk=
//! ```
//!
//! Older exports sometimes embedded a whole record inside the `key` field,
//! one or more times:
//!
//! ```yaml
//! key: |
//!   key: |
//!     key: gKNJBnflqQA6lfUKLWMwl7CMJk4j+qqG9jnGYdTvwTk=
//! ```
//!
//! [`KeyRecord::parse`] peels those layers, at most [`MAX_UNWRAP_DEPTH`] times.

use base64::{
    engine::general_purpose::{STANDARD as B64, STANDARD_NO_PAD as B64_NO_PAD},
    Engine,
};
use chartcrypt_core::{CryptError, CryptResult};
use serde::{Deserialize, Serialize};
use serde_yml::Value;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::key::SymmetricKey;
use crate::random::random_bytes;
use crate::KEY_SIZE;

/// How many nested layers `parse` will unwrap before giving up.
pub const MAX_UNWRAP_DEPTH: usize = 5;

#[derive(Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
}

/// One step of the unwrap loop.
enum Layer {
    Terminal { key: String, version: Option<u32> },
    Nested(Value),
}

impl KeyRecord {
    /// A record holding freshly generated random key material.
    pub fn generate() -> Self {
        Self {
            key: random_bytes(KEY_SIZE),
            version: None,
        }
    }

    pub fn from_key(key: &SymmetricKey) -> Self {
        Self {
            key: B64.encode(key.as_bytes()),
            version: None,
        }
    }

    /// Parse a record, unwrapping self-nested layers.
    ///
    /// The result always holds a key that decodes to exactly [`KEY_SIZE`] bytes.
    pub fn parse(doc: &str) -> CryptResult<Self> {
        let mut current: Value = serde_yml::from_str(doc)
            .map_err(|e| CryptError::KeyUnreadable(format!("not a key record: {e}")))?;

        for depth in 0..=MAX_UNWRAP_DEPTH {
            match peel(&current)? {
                Layer::Terminal { key, version } => {
                    if depth > 0 {
                        tracing::warn!(depth, "unwrapped nested key record");
                    }
                    let record = Self { key, version };
                    record.symmetric_key()?;
                    return Ok(record);
                }
                Layer::Nested(inner) => current = inner,
            }
        }

        Err(CryptError::CorruptedKeyBlob {
            depth: MAX_UNWRAP_DEPTH,
        })
    }

    pub fn parse_bytes(doc: &[u8]) -> CryptResult<Self> {
        let doc = std::str::from_utf8(doc)
            .map_err(|_| CryptError::KeyUnreadable("key record is not valid UTF-8".into()))?;
        Self::parse(doc)
    }

    /// Decode the key material, rejecting anything that is not exactly [`KEY_SIZE`] bytes.
    pub fn symmetric_key(&self) -> CryptResult<SymmetricKey> {
        let mut decoded = B64
            .decode(self.key.as_bytes())
            .map_err(|e| CryptError::KeyUnreadable(format!("key is not valid base64: {e}")))?;

        let key = SymmetricKey::from_slice(&decoded);
        let len = decoded.len();
        decoded.zeroize();

        key.ok_or_else(|| {
            CryptError::KeyUnreadable(format!(
                "key decodes to {len} bytes (expected {KEY_SIZE})"
            ))
        })
    }

    /// Serialized form written to the key file and printed by `export`.
    ///
    /// Always ends in exactly one newline, whatever the emitter produced.
    pub fn to_yaml(&self) -> CryptResult<String> {
        let yaml = serde_yml::to_string(self)
            .map_err(|e| CryptError::from(anyhow::anyhow!("serializing key record: {e}")))?;
        let mut canonical = yaml.trim_end_matches('\n').to_string();
        canonical.push('\n');
        Ok(canonical)
    }

    /// Fingerprint safe to log: `SHA256:<unpadded base64>` of the encoded key.
    pub fn id(&self) -> String {
        let digest = Sha256::digest(self.key.as_bytes());
        format!("SHA256:{}", B64_NO_PAD.encode(digest))
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }
}

fn peel(value: &Value) -> CryptResult<Layer> {
    let inner = value
        .get("key")
        .ok_or_else(|| CryptError::KeyUnreadable("record has no `key` field".into()))?;

    match inner {
        Value::String(s) => match nested_record(s) {
            Some(nested) => Ok(Layer::Nested(nested)),
            None => Ok(Layer::Terminal {
                key: s.trim().to_string(),
                version: value
                    .get("version")
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok()),
            }),
        },
        Value::Mapping(_) => Ok(Layer::Nested(inner.clone())),
        _ => Err(CryptError::KeyUnreadable(
            "`key` field is not a string".into(),
        )),
    }
}

/// A string field that is itself a YAML document with a `key` entry.
fn nested_record(s: &str) -> Option<Value> {
    let value: Value = serde_yml::from_str(s).ok()?;
    value.get("key").is_some().then_some(value)
}

impl PartialEq for KeyRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.version == other.version
    }
}

impl Eq for KeyRecord {}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("id", &self.id())
            .field("version", &self.version)
            .finish()
    }
}
