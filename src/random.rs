//! Secure random byte generation
//!
//! All randomness comes from the operating system generator via `OsRng`.
//! `OsRng` is a zero-sized handle, so concurrent callers never contend on
//! shared generator state.

use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use rand::RngCore;
use rand::rngs::OsRng;

/// Fill `buf` from the OS secure random source.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        DocsealError::with_source(
            ErrorCategory::Internal,
            ErrorKind::RandomGeneration,
            format!("secure random source failed: {}", e),
            e,
        )
    })
}

/// Largest byte count a single request may ask for (1 MiB).
pub const MAX_RANDOM_BYTES: usize = 1 << 20;

/// Return `bytes` freshly generated random bytes.
pub fn random_bytes(bytes: usize) -> Result<Vec<u8>> {
    if bytes == 0 {
        return Err(DocsealError::new(
            ErrorCategory::User,
            ErrorKind::RandomGeneration,
            "requested random byte count must be greater than zero",
        ));
    }
    if bytes > MAX_RANDOM_BYTES {
        return Err(DocsealError::new(
            ErrorCategory::User,
            ErrorKind::RandomGeneration,
            format!(
                "requested random byte count {} exceeds the limit of {}",
                bytes, MAX_RANDOM_BYTES
            ),
        ));
    }
    let mut buf = vec![0u8; bytes];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate `bytes` random bytes and return them as a lowercase hex string
/// of length `2 * bytes`.
pub fn generate_random_string(bytes: usize) -> Result<String> {
    random_bytes(bytes).map(hex::encode)
}
