//! Password hashing for basic-auth users.
//!
//! Salted SHA-256, stored as `hex(salt)$hex(digest)`. Verification is
//! constant-time over the digest.

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SALT_LENGTH: usize = 16;

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), hex::encode(digest(&salt, password)))
}

/// Verify a password against a stored `salt$digest` hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    digest(&salt, password).ct_eq(&expected).into()
}
