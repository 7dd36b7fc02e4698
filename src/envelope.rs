//! Versioned encryption envelope
//!
//! An envelope is the unit a store persists: four fields, serialized as a JSON
//! object with exactly these keys:
//! - `ct`: base64 ciphertext (see [`crate::cipher`])
//! - `iv`: hex IV, freshly generated for every envelope
//! - `src`: caller-defined provenance tag
//! - `v`: format version, naming the cipher scheme used
//!
//! Opening checks the version before anything else, so data written by a
//! newer scheme is rejected rather than misread.

use crate::cipher::{self, Iv, Key};
use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Version stamped on newly created envelopes.
pub const CURRENT_VERSION: u32 = 1;

/// Source tag used by [`encrypt_text`].
pub const DEFAULT_SOURCE: &str = "docseal";

/// Envelope schemes this build can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnvelopeVersion {
    /// XSalsa20Poly1305 over the base64 form of the UTF-8 text.
    V1,
}

impl EnvelopeVersion {
    pub const CURRENT: Self = Self::V1;

    pub fn number(self) -> u32 {
        match self {
            Self::V1 => 1,
        }
    }

    pub fn from_number(v: u32) -> Result<Self> {
        match v {
            1 => Ok(Self::V1),
            other => Err(unsupported(other)),
        }
    }
}

fn unsupported(v: impl std::fmt::Display) -> DocsealError {
    DocsealError::new(
        ErrorCategory::User,
        ErrorKind::UnsupportedVersion,
        format!(
            "envelope version {} is not supported (supported: {})",
            v, CURRENT_VERSION
        ),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    pub ct: String,
    pub iv: String,
    pub src: String,
    pub v: u32,
}

/// Wire shape with every field optional, so a missing key is reported as a
/// malformed envelope rather than a generic parse failure. Unknown keys are
/// ignored. `v` is taken as any JSON number so that out-of-range versions
/// are reported as unsupported.
#[derive(Deserialize)]
struct RawEnvelope {
    ct: Option<String>,
    iv: Option<String>,
    src: Option<String>,
    v: Option<serde_json::Number>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = DocsealError;

    fn try_from(raw: RawEnvelope) -> Result<Self> {
        let ct = raw.ct.ok_or_else(|| missing("ct"))?;
        let iv = raw.iv.ok_or_else(|| missing("iv"))?;
        let src = raw.src.ok_or_else(|| missing("src"))?;
        let number = raw.v.ok_or_else(|| missing("v"))?;
        let v = number
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| unsupported(&number))?;
        Ok(Self { ct, iv, src, v })
    }
}

impl Envelope {
    /// Parse the JSON object form.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_str(json).map_err(malformed)?;
        Self::try_from(raw)
    }

    /// Convert an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_value(value).map_err(malformed)?;
        Self::try_from(raw)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to serialize envelope",
                e,
            )
        })
    }

    pub fn version(&self) -> Result<EnvelopeVersion> {
        EnvelopeVersion::from_number(self.v)
    }
}

/// Encrypt `text` under a hex `key`, tagged with [`DEFAULT_SOURCE`].
pub fn encrypt_text(text: &str, key: &str) -> Result<Envelope> {
    encrypt_text_with_source(text, key, DEFAULT_SOURCE)
}

/// Encrypt `text` under a hex `key`, tagged with `src`.
pub fn encrypt_text_with_source(text: &str, key: &str, src: &str) -> Result<Envelope> {
    let key = Key::from_hex(key).map_err(|e| e.wrap_as(ErrorKind::Encryption, "invalid key"))?;
    seal_text(&key, text, src)
}

/// Encrypt `text` under a typed key. A new IV is drawn for every call.
pub fn seal_text(key: &Key, text: &str, src: &str) -> Result<Envelope> {
    let iv = Iv::random().map_err(|e| e.wrap_as(ErrorKind::Encryption, "failed to generate iv"))?;
    let ct = cipher::encrypt_with(key, &iv, text, true)?;
    let version = EnvelopeVersion::CURRENT;
    debug!(v = version.number(), src, ct_len = ct.len(), "sealed envelope");
    Ok(Envelope {
        ct,
        iv: iv.to_hex(),
        src: src.to_owned(),
        v: version.number(),
    })
}

/// Decrypt an envelope with a hex `key`.
pub fn decrypt_with_key(key: &str, envelope: &Envelope) -> Result<String> {
    let version = envelope.version()?;
    let key = Key::from_hex(key).map_err(|e| e.wrap_as(ErrorKind::Decryption, "invalid key"))?;
    open_versioned(&key, envelope, version)
}

/// Decrypt an envelope with a typed key.
pub fn open_text(key: &Key, envelope: &Envelope) -> Result<String> {
    let version = envelope.version()?;
    open_versioned(key, envelope, version)
}

fn open_versioned(key: &Key, envelope: &Envelope, version: EnvelopeVersion) -> Result<String> {
    if envelope.ct.is_empty() {
        return Err(missing("ct"));
    }
    if envelope.iv.is_empty() {
        return Err(missing("iv"));
    }
    let iv = Iv::from_hex(&envelope.iv)
        .map_err(|e| e.wrap_as(ErrorKind::MalformedEnvelope, "envelope iv is not decodable"))?;
    let sealed = cipher::decode_ciphertext(&envelope.ct)?;

    let text = match version {
        EnvelopeVersion::V1 => cipher::decrypt_with(key, &iv, &sealed, true, true)?,
    };
    debug!(v = envelope.v, src = envelope.src.as_str(), "opened envelope");
    Ok(text)
}

fn missing(field: &str) -> DocsealError {
    DocsealError::new(
        ErrorCategory::User,
        ErrorKind::MalformedEnvelope,
        format!("envelope is missing field `{}`", field),
    )
}

fn malformed(e: serde_json::Error) -> DocsealError {
    DocsealError::with_source(
        ErrorCategory::User,
        ErrorKind::MalformedEnvelope,
        format!("envelope is malformed: {}", e),
        e,
    )
}
