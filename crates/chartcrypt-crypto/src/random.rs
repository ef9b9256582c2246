//! Random string generation (`chartcrypt random`, key generation)

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use zeroize::Zeroize;

/// `n` CSPRNG bytes as padded standard base64. Decodes back to exactly `n` bytes.
pub fn random_bytes(n: usize) -> String {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    let encoded = B64.encode(&buf);
    buf.zeroize();
    encoded
}
