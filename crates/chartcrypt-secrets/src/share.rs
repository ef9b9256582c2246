//! Identity registration and recipient sharing.

use std::path::Path;

use chartcrypt_core::{CryptError, CryptResult};
use crate::envelope::{Recipient, RepoEnvelope};
use crate::identity::LocalIdentity;
use crate::registry::KeyRegistry;
use crate::resolve::KeyResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySetup {
    pub public_key: String,
    /// `false` when an existing identity file was reused.
    pub generated: bool,
}

/// Ensure a local identity exists and register its public key under `name`.
///
/// An existing identity is kept; registration happens every time.
pub async fn setup_identity(
    registry: &dyn KeyRegistry,
    identity_path: &Path,
    name: &str,
) -> CryptResult<IdentitySetup> {
    let (identity, generated) = match LocalIdentity::load(identity_path).await? {
        Some(identity) => {
            tracing::debug!(path = %identity_path.display(), "reusing existing identity");
            (identity, false)
        }
        None => {
            let identity = LocalIdentity::generate();
            identity.save(identity_path).await?;
            (identity, true)
        }
    };

    let public_key = identity.public_key();
    registry.create_key(name, &public_key).await?;

    Ok(IdentitySetup {
        public_key,
        generated,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareOutcome {
    /// Recipients newly added by this call.
    pub added: usize,
    /// Total recipients the envelope is now wrapped to.
    pub total: usize,
}

/// Grant every address in `emails` access to the repository key.
///
/// All-or-nothing: if any address has no registered key the call fails with
/// [`CryptError::RecipientResolution`] naming exactly those addresses, and the
/// envelope is left untouched. Addresses match ASCII case-insensitively.
///
/// The key wrapped is whichever `keys` resolves, so a member who only holds
/// the envelope re-shares the same key.
pub async fn share(
    registry: &dyn KeyRegistry,
    envelope: &RepoEnvelope,
    keys: &KeyResolver,
    emails: &[String],
) -> CryptResult<ShareOutcome> {
    let found = registry.list_keys(emails).await?;

    let mut missing: Vec<String> = Vec::new();
    for email in emails {
        let resolved = found.iter().any(|k| k.email.eq_ignore_ascii_case(email));
        if !resolved && !missing.iter().any(|m| m.eq_ignore_ascii_case(email)) {
            missing.push(email.clone());
        }
    }
    if !missing.is_empty() {
        return Err(CryptError::RecipientResolution {
            identities: missing,
        });
    }

    let mut recipients = envelope.load_recipients().await?;
    let resolved = found
        .into_iter()
        .filter(|k| emails.iter().any(|e| e.eq_ignore_ascii_case(&k.email)))
        .map(|k| Recipient {
            email: k.email,
            public_key: k.content,
        });
    let added = recipients.merge(resolved);

    let (record, source) = keys.resolve().await?;
    tracing::debug!(?source, id = %record.id(), "sharing key");
    envelope.flush(&record, &recipients).await?;

    Ok(ShareOutcome {
        added,
        total: recipients.len(),
    })
}
