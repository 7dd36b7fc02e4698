//! Where the command-line tool gets its passphrase
//!
//! The library only ever sees a `&str`. These readers turn stdin, a terminal
//! or a test constant into that string, held in a `Zeroizing` buffer.

use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// A source of one passphrase per call.
pub trait PassphraseReader {
    /// Produce the passphrase as validated UTF-8, wiped on drop.
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>>;
}

/// Hands out the same passphrase on every call. Used by tests.
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<String>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.passphrase.clone())
    }
}

/// Consumes a byte stream (normally piped stdin) to EOF.
///
/// A single trailing line ending is dropped, so `echo pw | docseal ...`
/// yields `pw`.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader
            .read_to_end(&mut data)
            .map_err(|e| io_failure("error reading passphrase", e))?;

        let line = strip_line_ending(&data);
        let text = std::str::from_utf8(line).map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "passphrase is not valid UTF-8",
                e,
            )
        })?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

fn strip_line_ending(data: &[u8]) -> &[u8] {
    match data.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => data,
    }
}

/// Prompts on stderr with `Passphrase (docseal): ` and reads one line from
/// the controlling terminal with echo disabled.
///
/// Fails with `PassphraseUnavailable` when stdin is not a terminal; scripted
/// callers pass `--passphrase-stdin` instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPassphraseReader;

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(DocsealError::new(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "stdin is not a terminal; use --passphrase-stdin to pipe a passphrase",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(b"Passphrase (docseal): ")
            .and_then(|()| stderr.flush())
            .map_err(|e| io_failure("failed to write prompt", e))?;

        let passphrase = rpassword::read_password().map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("no passphrase read from terminal: {}", e),
                e,
            )
        })?;
        Ok(Zeroizing::new(passphrase))
    }
}

fn io_failure(what: &str, e: io::Error) -> DocsealError {
    DocsealError::with_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("{}: {}", what, e),
        e,
    )
}
