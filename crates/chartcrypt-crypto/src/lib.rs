//! chartcrypt-crypto: symmetric encryption for files committed through git filters
//!
//! Payload format (binary):
//! ```text
//! "CHARTMART-ENCRYPTED" || [12 bytes: random nonce] || [ciphertext] || [16 bytes: GCM tag]
//! ```
//!
//! The magic prefix is the only signal that a buffer is already encrypted.
//! `seal` leaves prefixed input alone and `open` passes unprefixed input
//! through, so the clean/smudge filters are safe to run any number of times.
//!
//! Key material lives in a single YAML file (`key: <base64>`), see [`record`].

pub mod cipher;
pub mod key;
pub mod random;
pub mod record;
pub mod store;

pub use cipher::{decrypt, encrypt, is_encrypted, open, seal};
pub use key::SymmetricKey;
pub use random::random_bytes;
pub use record::{KeyRecord, MAX_UNWRAP_DEPTH};
pub use store::KeyStore;

/// Size of the AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Marker prepended to every payload this crate produces. Never change it.
pub const MAGIC_PREFIX: &[u8] = b"CHARTMART-ENCRYPTED";
