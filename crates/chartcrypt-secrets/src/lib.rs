//! chartcrypt-secrets: everything that reaches beyond the local key file
//!
//! - [`identity`]: the user's age X25519 identity (`~/.chartcrypt/identity`)
//! - [`envelope`]: the repository key wrapped to every recipient (`.chartcrypt-crypt/`)
//! - [`registry`]: public-key lookup and registration against the API
//! - [`share`]: `setup-keys` and `share` built on the three above
//! - [`cluster`] / [`recovery`]: restore the key from a running cluster's secret
//! - [`resolve`]: which key the clean/smudge filters should use

mod atomic;
pub mod cluster;
pub mod envelope;
pub mod identity;
pub mod recovery;
pub mod registry;
pub mod resolve;
pub mod share;

pub use cluster::{KubeSecretSource, SecretSource};
pub use envelope::{Recipient, RecipientSet, RepoEnvelope};
pub use identity::LocalIdentity;
pub use recovery::recover;
pub use registry::{GraphqlRegistry, KeyRegistry, PublicKey};
pub use resolve::{KeyResolver, KeySource};
pub use share::{setup_identity, share, IdentitySetup, ShareOutcome};
