//! Bearer token generation and hashing. Only hashes are ever persisted.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// 256-bit random token from the OS-seeded CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex SHA-256 of a token, used as the lookup key.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
