//! docseal - encryption envelopes for locally persisted JSON documents
//!
//! The crate is a set of stateless primitives a document store calls into:
//!
//! - [`random`]: secure random strings for IVs and salts
//! - [`kdf`]: PBKDF2-HMAC-SHA256 key derivation from a passphrase
//! - [`cipher`]: raw XSalsa20Poly1305 encryption of text with base64 transforms
//! - [`envelope`]: the versioned `{ct, iv, src, v}` record that gets persisted
//!
//! ```no_run
//! let key = docseal::derive_key("correct horse battery staple", "a1b2c3", 10_000)?;
//! let envelope = docseal::encrypt_text("hello world", &key)?;
//! assert_eq!(docseal::decrypt_with_key(&key, &envelope)?, "hello world");
//! # Ok::<(), docseal::DocsealError>(())
//! ```

#![forbid(unsafe_code)]

pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod passphrase;
pub mod random;

pub use config::Config;
pub use envelope::{Envelope, decrypt_with_key, encrypt_text};
pub use error::{DocsealError, ErrorCategory, ErrorKind, Result};
pub use kdf::derive_key;
pub use random::generate_random_string;
