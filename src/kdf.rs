//! Password-based key derivation (PBKDF2-HMAC-SHA256)
//!
//! The derived key is a pure function of password, salt and iteration count,
//! so a passphrase regenerates the same key across sessions without the key
//! itself ever being stored.

use crate::cipher::{KEY_LEN, Key};
use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use crate::random;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::warn;
use zeroize::Zeroize;

/// Iteration counts below this are accepted but logged as weak.
pub const RECOMMENDED_MIN_ITERATIONS: u32 = 10_000;

/// Iteration count used when the caller does not configure one.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Length of a generated salt in bytes
pub const SALT_LEN: usize = 16;

/// Derive a key and return it as 64 lowercase hex characters.
pub fn derive_key(password: &str, salt: &str, iterations: u32) -> Result<String> {
    derive_key_bytes(password, salt, iterations).map(|key| key.to_hex())
}

/// Derive a key from `password` and the UTF-8 bytes of `salt`.
pub fn derive_key_bytes(password: &str, salt: &str, iterations: u32) -> Result<Key> {
    if password.is_empty() {
        return Err(invalid_input("password must not be empty"));
    }
    if salt.is_empty() {
        return Err(invalid_input("salt must not be empty"));
    }
    if iterations == 0 {
        return Err(invalid_input("iteration count must be greater than zero"));
    }
    if iterations < RECOMMENDED_MIN_ITERATIONS {
        warn!(
            iterations,
            recommended = RECOMMENDED_MIN_ITERATIONS,
            "key derivation iteration count is below the recommended minimum"
        );
    }

    let mut bytes = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut bytes);
    let key = Key::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Generate a fresh random salt in the same hex form as
/// [`random::generate_random_string`].
pub fn generate_salt() -> Result<String> {
    random::generate_random_string(SALT_LEN)
}

fn invalid_input(msg: &str) -> DocsealError {
    DocsealError::new(ErrorCategory::User, ErrorKind::KeyDerivation, msg)
}
