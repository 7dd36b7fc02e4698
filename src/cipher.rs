//! Authenticated symmetric encryption of text payloads
//!
//! This module implements the raw codec underneath the envelope format using
//! NaCl secretbox (XSalsa20Poly1305):
//! - key: 32 bytes, exchanged as 64 hex characters
//! - iv: 24-byte extended nonce, exchanged as 48 hex characters
//! - ciphertext: standard base64 of the sealed box (16-byte Poly1305 tag
//!   followed by the encrypted payload)
//!
//! Because the mode is authenticated, a wrong key or any modification of the
//! ciphertext fails the tag check instead of yielding wrong plaintext. The
//! optional base64 checks on the opened payload are a second line on top of
//! that.

use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use crate::random;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::{DecodePaddingMode, Engine};
use crypto_secretbox::aead::generic_array::GenericArray;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use std::fmt;
use zeroize::Zeroizing;

/// Length of a key in bytes
pub const KEY_LEN: usize = 32;

/// Length of an IV in bytes
pub const IV_LEN: usize = 24;

/// Length of the Poly1305 tag prefixed to every sealed box
pub const TAG_LEN: usize = 16;

/// Accepts unpadded or oddly padded input and tolerates trailing bits.
/// Used only when a payload is decoded without the strict format check.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone)]
pub struct Key(Zeroizing<[u8; KEY_LEN]>);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse a key from its 64-character hex form.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        hex::decode_to_slice(encoded, &mut bytes[..]).map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::User,
                ErrorKind::InvalidKey,
                format!("key must be {} hex characters", KEY_LEN * 2),
                e,
            )
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0[..])
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// Initialization vector (the secretbox nonce). Not secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    pub fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh IV from the OS secure random source.
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; IV_LEN];
        random::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Parse an IV from its 48-character hex form.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = [0u8; IV_LEN];
        hex::decode_to_slice(encoded, &mut bytes).map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::User,
                ErrorKind::InvalidKey,
                format!("iv must be {} hex characters", IV_LEN * 2),
                e,
            )
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Seal `payload` under `key` and `iv`, returning tag || ciphertext.
///
/// The caller must never reuse an IV with the same key.
pub fn seal(key: &Key, iv: &Iv, payload: &[u8]) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = Nonce::from(*iv.as_bytes());
    cipher.encrypt(&nonce, payload).map_err(|e| {
        DocsealError::new(
            ErrorCategory::Internal,
            ErrorKind::Encryption,
            format!("encryption failed: {}", e),
        )
    })
}

/// Open a sealed box produced by [`seal`].
pub fn open(key: &Key, iv: &Iv, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < TAG_LEN {
        return Err(DocsealError::new(
            ErrorCategory::User,
            ErrorKind::Decryption,
            "ciphertext shorter than authentication tag; likely truncated",
        ));
    }
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = Nonce::from(*iv.as_bytes());
    cipher.decrypt(&nonce, sealed).map_err(|_| {
        DocsealError::new(
            ErrorCategory::User,
            ErrorKind::Decryption,
            "corrupt input, tampered-with data, or wrong key",
        )
    })
}

/// Encrypt `plaintext` with a hex `key` and hex `iv`, returning base64 ciphertext.
///
/// When `convert_base64_before_encrypt` is set the plaintext is base64-encoded
/// before sealing.
pub fn encrypt(
    key: &str,
    plaintext: &str,
    iv: &str,
    convert_base64_before_encrypt: bool,
) -> Result<String> {
    let key = Key::from_hex(key).map_err(|e| e.wrap_as(ErrorKind::Encryption, "invalid key"))?;
    let iv = Iv::from_hex(iv).map_err(|e| e.wrap_as(ErrorKind::Encryption, "invalid iv"))?;
    encrypt_with(&key, &iv, plaintext, convert_base64_before_encrypt)
}

/// Decrypt base64 `ciphertext` with a hex `key` and hex `iv`.
///
/// With `check_base64_encoding` the opened payload must be canonical base64.
/// With `decode_base64_after_decrypt` it is base64-decoded before being
/// returned. Either way the result is all-or-nothing.
pub fn decrypt(
    key: &str,
    ciphertext: &str,
    iv: &str,
    decode_base64_after_decrypt: bool,
    check_base64_encoding: bool,
) -> Result<String> {
    let key = Key::from_hex(key).map_err(|e| e.wrap_as(ErrorKind::Decryption, "invalid key"))?;
    let iv = Iv::from_hex(iv).map_err(|e| e.wrap_as(ErrorKind::Decryption, "invalid iv"))?;
    let sealed = decode_ciphertext(ciphertext)
        .map_err(|e| e.wrap_as(ErrorKind::Decryption, "invalid ciphertext"))?;
    decrypt_with(
        &key,
        &iv,
        &sealed,
        decode_base64_after_decrypt,
        check_base64_encoding,
    )
}

pub(crate) fn encrypt_with(
    key: &Key,
    iv: &Iv,
    plaintext: &str,
    convert_base64_before_encrypt: bool,
) -> Result<String> {
    let sealed = if convert_base64_before_encrypt {
        let encoded = Zeroizing::new(STANDARD.encode(plaintext));
        seal(key, iv, encoded.as_bytes())?
    } else {
        seal(key, iv, plaintext.as_bytes())?
    };
    Ok(STANDARD.encode(sealed))
}

pub(crate) fn decrypt_with(
    key: &Key,
    iv: &Iv,
    sealed: &[u8],
    decode_base64_after_decrypt: bool,
    check_base64_encoding: bool,
) -> Result<String> {
    let opened = Zeroizing::new(open(key, iv, sealed)?);
    let text = std::str::from_utf8(&opened).map_err(|e| {
        DocsealError::with_source(
            ErrorCategory::User,
            ErrorKind::Decryption,
            "decrypted payload is not valid UTF-8",
            e,
        )
    })?;

    if !decode_base64_after_decrypt {
        if check_base64_encoding {
            STANDARD.decode(text).map_err(not_base64)?;
        }
        return Ok(text.to_owned());
    }

    let decoded = if check_base64_encoding {
        STANDARD.decode(text).map_err(not_base64)?
    } else {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        LENIENT.decode(compact).map_err(not_base64)?
    };
    String::from_utf8(decoded).map_err(|e| {
        DocsealError::with_source(
            ErrorCategory::User,
            ErrorKind::Decryption,
            "decoded payload is not valid UTF-8",
            e,
        )
    })
}

/// Decode the outer base64 layer of a ciphertext string.
///
/// Reported as a malformed envelope; callers outside the envelope layer
/// re-tag it.
pub(crate) fn decode_ciphertext(ciphertext: &str) -> Result<Vec<u8>> {
    STANDARD.decode(ciphertext).map_err(|e| {
        DocsealError::with_source(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            format!("ciphertext base64 decoding failed: {}", e),
            e,
        )
    })
}

fn not_base64(e: base64::DecodeError) -> DocsealError {
    DocsealError::with_source(
        ErrorCategory::User,
        ErrorKind::Decryption,
        "decrypted payload is not valid base64; likely wrong key or corrupt data",
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const OTHER_KEY: &str = "1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100";
    const IV: &str = "242424242424242424242424242424242424242424242424";

    #[test]
    fn test_roundtrip_with_base64() {
        let ct = encrypt(KEY, "hello world", IV, true).unwrap();
        let pt = decrypt(KEY, &ct, IV, true, true).unwrap();
        assert_eq!(pt, "hello world");
    }

    #[test]
    fn test_roundtrip_without_base64() {
        let ct = encrypt(KEY, "{\"name\":\"carlos\"}", IV, false).unwrap();
        let pt = decrypt(KEY, &ct, IV, false, false).unwrap();
        assert_eq!(pt, "{\"name\":\"carlos\"}");
    }

    #[test]
    fn test_base64_conversion_is_visible_without_decoding() {
        let ct = encrypt(KEY, "hello", IV, true).unwrap();
        let pt = decrypt(KEY, &ct, IV, false, true).unwrap();
        assert_eq!(pt, "aGVsbG8=");
    }

    #[test]
    fn test_empty_plaintext() {
        let ct = encrypt(KEY, "", IV, true).unwrap();
        assert_eq!(STANDARD.decode(&ct).unwrap().len(), TAG_LEN);
        assert_eq!(decrypt(KEY, &ct, IV, true, true).unwrap(), "");
    }

    #[test]
    fn test_ciphertext_is_deterministic_for_fixed_iv() {
        let ct1 = encrypt(KEY, "same", IV, true).unwrap();
        let ct2 = encrypt(KEY, "same", IV, true).unwrap();
        assert_eq!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key() {
        let ct = encrypt(KEY, "secret data", IV, true).unwrap();
        let err = decrypt(OTHER_KEY, &ct, IV, true, true).expect_err("expected auth failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
        assert!(err.to_string().contains("wrong key"));
    }

    #[test]
    fn test_wrong_iv() {
        let ct = encrypt(KEY, "secret data", IV, true).unwrap();
        let other_iv = "252525252525252525252525252525252525252525252525";
        let err = decrypt(KEY, &ct, other_iv, true, true).expect_err("expected auth failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
    }

    #[test]
    fn test_tampered_ciphertext() {
        let ct = encrypt(KEY, "secret data", IV, true).unwrap();
        let mut sealed = STANDARD.decode(&ct).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        let tampered = STANDARD.encode(sealed);
        let err = decrypt(KEY, &tampered, IV, true, true).expect_err("expected auth failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
    }

    #[test]
    fn test_truncated_ciphertext() {
        let short = STANDARD.encode([0u8; TAG_LEN - 1]);
        let err = decrypt(KEY, &short, IV, true, true).expect_err("expected truncation");
        assert_eq!(err.kind, ErrorKind::Decryption);
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_invalid_ciphertext_base64() {
        let err = decrypt(KEY, "not base64 $$", IV, true, true).expect_err("expected decode error");
        assert_eq!(err.kind, ErrorKind::Decryption);
    }

    #[test]
    fn test_check_rejects_non_base64_payload() {
        // Sealed without base64 conversion, so the payload is raw text.
        let ct = encrypt(KEY, "plain $ text", IV, false).unwrap();
        let err = decrypt(KEY, &ct, IV, true, true).expect_err("expected format failure");
        assert_eq!(err.kind, ErrorKind::Decryption);

        let err = decrypt(KEY, &ct, IV, false, true).expect_err("expected format failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
    }

    #[test]
    fn test_lenient_decode_without_check() {
        // Unpadded base64 with embedded whitespace.
        let ct = encrypt(KEY, "aGVs\nbG8", IV, false).unwrap();
        assert!(decrypt(KEY, &ct, IV, true, true).is_err());
        assert_eq!(decrypt(KEY, &ct, IV, true, false).unwrap(), "hello");
    }

    #[test]
    fn test_decoded_payload_must_be_utf8() {
        let raw = STANDARD.encode([0xffu8, 0xfe]);
        let ct = encrypt(KEY, &raw, IV, false).unwrap();
        let err = decrypt(KEY, &ct, IV, true, true).expect_err("expected utf-8 failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
    }

    #[test]
    fn test_invalid_key_strings() {
        let err = encrypt("abcd", "x", IV, true).expect_err("expected invalid key");
        assert_eq!(err.kind, ErrorKind::Encryption);

        let err = encrypt(KEY, "x", "zz", true).expect_err("expected invalid iv");
        assert_eq!(err.kind, ErrorKind::Encryption);

        let ct = encrypt(KEY, "x", IV, true).unwrap();
        let err = decrypt("not-hex", &ct, IV, true, true).expect_err("expected invalid key");
        assert_eq!(err.kind, ErrorKind::Decryption);
    }

    #[test]
    fn test_low_level_seal_open() {
        let key = Key::from_hex(KEY).unwrap();
        let iv = Iv::random().unwrap();
        let payload: Vec<u8> = (0..=255).collect();

        let sealed = seal(&key, &iv, &payload).unwrap();
        assert_eq!(sealed.len(), payload.len() + TAG_LEN);
        assert_eq!(open(&key, &iv, &sealed).unwrap(), payload);
    }

    #[test]
    fn test_key_hex_roundtrip_and_debug() {
        let key = Key::from_hex(KEY).unwrap();
        assert_eq!(key.to_hex(), KEY);
        assert_eq!(format!("{:?}", key), "Key(..)");

        let iv = Iv::from_hex(IV).unwrap();
        assert_eq!(iv.to_hex(), IV);
        assert!(Iv::from_hex(&IV[2..]).is_err());
    }
}
