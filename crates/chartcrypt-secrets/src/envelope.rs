//! Repository key envelope
//!
//! The repository's [`KeyRecord`] is age-encrypted to every recipient and
//! committed alongside the recipient list:
//!
//! ```text
//! <repo>/.chartcrypt-crypt/key.age          armored age ciphertext of the record
//! <repo>/.chartcrypt-crypt/recipients.json  { "recipients": [{ "email", "public_key" }] }
//! ```

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use age::armor::{ArmoredReader, ArmoredWriter, Format};
use age::x25519;
use chartcrypt_core::{paths::REPO_DIR, CryptError, CryptResult};
use chartcrypt_crypto::KeyRecord;
use serde::{Deserialize, Serialize};

use crate::atomic::atomic_replace;
use crate::identity::LocalIdentity;

pub const ENVELOPE_FILE: &str = "key.age";
pub const RECIPIENTS_FILE: &str = "recipients.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    /// `age1...`
    pub public_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSet {
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl RecipientSet {
    pub fn from_json(bytes: &[u8]) -> CryptResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CryptError::Identity(format!("parsing recipient list: {e}")))
    }

    pub fn to_json(&self) -> CryptResult<String> {
        serde_json::to_string_pretty(self)
            .map(|mut json| {
                json.push('\n');
                json
            })
            .map_err(|e| CryptError::Other(e.into()))
    }

    /// Add recipients whose public key is not already present. Returns how many were new.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Recipient>) -> usize {
        let mut added = 0;
        for recipient in incoming {
            if self
                .recipients
                .iter()
                .any(|r| r.public_key == recipient.public_key)
            {
                continue;
            }
            self.recipients.push(recipient);
            added += 1;
        }
        added
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }
}

/// Encrypt `record` to every recipient, armored.
pub fn wrap(record: &KeyRecord, recipients: &RecipientSet) -> CryptResult<Vec<u8>> {
    let parsed = recipients
        .recipients
        .iter()
        .map(|r| {
            x25519::Recipient::from_str(&r.public_key).map_err(|e| {
                CryptError::Identity(format!("invalid public key for {}: {e}", r.email))
            })
        })
        .collect::<CryptResult<Vec<_>>>()?;

    let encryptor =
        age::Encryptor::with_recipients(parsed.iter().map(|r| r as &dyn age::Recipient))
            .map_err(|e| CryptError::Identity(format!("building age encryptor: {e}")))?;

    let yaml = record.to_yaml()?;
    let mut out = Vec::new();
    let armor = ArmoredWriter::wrap_output(&mut out, Format::AsciiArmor)?;
    let mut writer = encryptor.wrap_output(armor)?;
    writer.write_all(yaml.as_bytes())?;
    writer.finish()?.finish()?;

    Ok(out)
}

/// Decrypt an envelope produced by [`wrap`] with the local identity.
pub fn unwrap(armored: &[u8], identity: &LocalIdentity) -> CryptResult<KeyRecord> {
    let decryptor = age::Decryptor::new(ArmoredReader::new(armored))
        .map_err(|e| CryptError::Identity(format!("reading key envelope: {e}")))?;

    let mut reader = decryptor
        .decrypt(std::iter::once(identity.as_age() as &dyn age::Identity))
        .map_err(|e| CryptError::Identity(format!("decrypting key envelope: {e}")))?;

    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext)?;
    KeyRecord::parse_bytes(&plaintext)
}

/// The `.chartcrypt-crypt/` directory of one repository.
#[derive(Debug, Clone)]
pub struct RepoEnvelope {
    dir: PathBuf,
}

impl RepoEnvelope {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            dir: repo_root.join(REPO_DIR),
        }
    }

    /// Walk up from `start` to the nearest directory holding an envelope.
    pub fn find(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .map(Self::new)
            .find(|envelope| envelope.envelope_path().is_file())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn envelope_path(&self) -> PathBuf {
        self.dir.join(ENVELOPE_FILE)
    }

    pub fn recipients_path(&self) -> PathBuf {
        self.dir.join(RECIPIENTS_FILE)
    }

    /// Empty set when no recipient list has been written yet.
    pub async fn load_recipients(&self) -> CryptResult<RecipientSet> {
        let path = self.recipients_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => RecipientSet::from_json(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecipientSet::default()),
            Err(e) => Err(CryptError::file(&path, e)),
        }
    }

    /// Wrap `record` to `recipients` and write recipient list then envelope.
    ///
    /// The ciphertext is built before anything touches disk. Each file is
    /// replaced atomically but the pair is not; if the envelope write fails the
    /// list may name recipients the old envelope lacks, and the next `share`
    /// wraps to all of them.
    pub async fn flush(&self, record: &KeyRecord, recipients: &RecipientSet) -> CryptResult<()> {
        let envelope = wrap(record, recipients)?;
        let json = recipients.to_json()?;

        atomic_replace(&self.recipients_path(), json.as_bytes(), false).await?;
        atomic_replace(&self.envelope_path(), &envelope, false).await?;

        tracing::info!(
            dir = %self.dir.display(),
            recipients = recipients.len(),
            id = %record.id(),
            "flushed key envelope"
        );
        Ok(())
    }

    pub async fn unwrap_key(&self, identity: &LocalIdentity) -> CryptResult<KeyRecord> {
        let path = self.envelope_path();
        let armored = tokio::fs::read(&path)
            .await
            .map_err(|e| CryptError::file(&path, e))?;
        unwrap(&armored, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(email: &str, identity: &LocalIdentity) -> Recipient {
        Recipient {
            email: email.into(),
            public_key: identity.public_key(),
        }
    }

    #[test]
    fn test_every_recipient_can_unwrap() {
        let alice = LocalIdentity::generate();
        let bob = LocalIdentity::generate();
        let record = KeyRecord::generate();
        let set = RecipientSet {
            recipients: vec![recipient("a@example.com", &alice), recipient("b@example.com", &bob)],
        };

        let envelope = wrap(&record, &set).unwrap();

        assert!(envelope.starts_with(b"-----BEGIN AGE ENCRYPTED FILE-----"));
        assert_eq!(unwrap(&envelope, &alice).unwrap(), record);
        assert_eq!(unwrap(&envelope, &bob).unwrap(), record);
    }

    #[test]
    fn test_outsider_cannot_unwrap() {
        let alice = LocalIdentity::generate();
        let mallory = LocalIdentity::generate();
        let set = RecipientSet {
            recipients: vec![recipient("a@example.com", &alice)],
        };

        let envelope = wrap(&KeyRecord::generate(), &set).unwrap();

        assert!(matches!(
            unwrap(&envelope, &mallory),
            Err(CryptError::Identity(_))
        ));
    }

    #[test]
    fn test_wrap_rejects_bad_public_key() {
        let set = RecipientSet {
            recipients: vec![Recipient {
                email: "x@example.com".into(),
                public_key: "ssh-rsa AAAA".into(),
            }],
        };
        let err = wrap(&KeyRecord::generate(), &set).unwrap_err();
        assert!(err.to_string().contains("x@example.com"), "{err}");
    }

    #[test]
    fn test_wrap_with_no_recipients_fails() {
        assert!(wrap(&KeyRecord::generate(), &RecipientSet::default()).is_err());
    }

    #[test]
    fn test_merge_dedupes_by_public_key() {
        let alice = LocalIdentity::generate();
        let bob = LocalIdentity::generate();
        let mut set = RecipientSet {
            recipients: vec![recipient("a@example.com", &alice)],
        };

        let added = set.merge([
            recipient("alice@other.example", &alice),
            recipient("b@example.com", &bob),
        ]);

        assert_eq!(added, 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.recipients[0].email, "a@example.com");
    }

    #[test]
    fn test_recipients_json_shape() {
        let set = RecipientSet {
            recipients: vec![Recipient {
                email: "a@example.com".into(),
                public_key: "age1xyz".into(),
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&set.to_json().unwrap()).unwrap();
        assert_eq!(value["recipients"][0]["email"], "a@example.com");
        assert_eq!(value["recipients"][0]["public_key"], "age1xyz");
    }

    #[tokio::test]
    async fn test_flush_then_find_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let alice = LocalIdentity::generate();
        let record = KeyRecord::generate();
        let set = RecipientSet {
            recipients: vec![recipient("a@example.com", &alice)],
        };

        RepoEnvelope::new(dir.path()).flush(&record, &set).await.unwrap();

        let sub = dir.path().join("charts/app/helm");
        std::fs::create_dir_all(&sub).unwrap();
        let found = RepoEnvelope::find(&sub).unwrap();
        assert_eq!(found.dir(), dir.path().join(REPO_DIR));
        assert_eq!(found.load_recipients().await.unwrap(), set);
        assert_eq!(found.unwrap_key(&alice).await.unwrap(), record);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_envelope_write_keeps_new_recipient_list() {
        let dir = tempfile::tempdir().unwrap();
        let alice = LocalIdentity::generate();
        let envelope = RepoEnvelope::new(dir.path());
        // a non-empty directory where key.age should go makes the rename fail
        std::fs::create_dir_all(envelope.envelope_path().join("blocker")).unwrap();
        let set = RecipientSet {
            recipients: vec![recipient("a@example.com", &alice)],
        };

        assert!(envelope.flush(&KeyRecord::generate(), &set).await.is_err());

        assert_eq!(envelope.load_recipients().await.unwrap(), set);
    }

    #[tokio::test]
    async fn test_missing_recipients_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = RepoEnvelope::new(dir.path()).load_recipients().await.unwrap();
        assert!(set.is_empty());
    }
}
