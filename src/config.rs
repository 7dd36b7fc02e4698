//! Tunable defaults for sealing documents

use crate::envelope::DEFAULT_SOURCE;
use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use crate::kdf::DEFAULT_ITERATIONS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Provenance tag written into every envelope's `src` field.
    pub source: String,
    /// PBKDF2 iteration count for newly sealed documents. Existing documents
    /// keep the count they were sealed with.
    pub iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_owned(),
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl Config {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(DocsealError::new(
                ErrorCategory::User,
                ErrorKind::Encryption,
                "source tag must not be empty",
            ));
        }
        if self.iterations == 0 {
            return Err(DocsealError::new(
                ErrorCategory::User,
                ErrorKind::KeyDerivation,
                "iteration count must be greater than zero",
            ));
        }
        Ok(())
    }
}
