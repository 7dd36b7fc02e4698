use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee the error is not, for example,
    /// due to bad input - merely that it cannot be confidently determined by
    /// the code.
    Internal,

    /// The caller provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Condition flags for consumers that need to branch on the failure.
///
/// Every error carries exactly one kind. A caller can tell a wrong key
/// (`Decryption`) apart from damaged framing (`MalformedEnvelope`) and an
/// envelope written by a newer scheme (`UnsupportedVersion`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The OS secure random source was unavailable, or zero bytes were requested.
    RandomGeneration,
    /// PBKDF2 inputs were rejected (empty password/salt, zero iterations).
    KeyDerivation,
    /// Sealing a payload failed.
    Encryption,
    /// Authentication failed due to a wrong key, tampering or corruption, or
    /// the opened payload was not in the expected text/base64 form.
    Decryption,
    /// The envelope version is not one this build knows how to open.
    UnsupportedVersion,
    /// The envelope is missing a field or a field is not decodable.
    MalformedEnvelope,
    /// A key or IV string was not hex of the required length.
    InvalidKey,
    /// An envelope or sealed file could not be rendered as JSON.
    Serialization,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct DocsealError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific condition tag, always provided.
    pub kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl DocsealError {
    /// Creates a new error tagged with a category and kind.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let kind = self.kind;
        self.wrap_as(kind, msg)
    }

    /// Like [`with_context`](Self::with_context), but re-tags the wrapper with
    /// the kind of the operation that failed.
    pub fn wrap_as(self, kind: ErrorKind, msg: impl Into<String>) -> Self {
        let category = self.category;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// Renders the message followed by every source in the chain.
    pub fn chain_message(&self) -> String {
        let mut out = self.msg.clone();
        let mut next = StdError::source(self);
        while let Some(err) = next {
            out.push_str(": ");
            out.push_str(&err.to_string());
            next = err.source();
        }
        out
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, DocsealError>;
