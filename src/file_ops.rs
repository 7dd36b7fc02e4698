//! Sealed document files
//!
//! A sealed file is a JSON object holding the PBKDF2 salt and iteration count
//! next to the envelope:
//!
//! ```json
//! {"salt":"…","iterations":600000,"envelope":{"ct":"…","iv":"…","src":"docseal","v":1}}
//! ```
//!
//! The key itself is never written; it is re-derived from the passphrase.

use crate::config::Config;
use crate::envelope::{self, Envelope};
use crate::error::{DocsealError, ErrorCategory, ErrorKind, Result};
use crate::kdf;
use crate::passphrase::PassphraseReader;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealedFile {
    pub salt: String,
    pub iterations: u32,
    pub envelope: Envelope,
}

/// The envelope is kept as a JSON value until [`Envelope::from_value`] can
/// classify it, so a bad version is not flattened into a parse error.
#[derive(Deserialize)]
struct RawSealedFile {
    salt: String,
    iterations: u32,
    envelope: serde_json::Value,
}

impl SealedFile {
    /// Seal `text` under a key derived from `passphrase` and a fresh salt.
    pub fn seal(text: &str, passphrase: &str, config: &Config) -> Result<Self> {
        config.validate()?;
        let salt = kdf::generate_salt()?;
        let key = kdf::derive_key_bytes(passphrase, &salt, config.iterations)?;
        let envelope = envelope::seal_text(&key, text, &config.source)?;
        Ok(Self {
            salt,
            iterations: config.iterations,
            envelope,
        })
    }

    pub fn open(&self, passphrase: &str) -> Result<String> {
        let key = kdf::derive_key_bytes(passphrase, &self.salt, self.iterations)?;
        envelope::open_text(&key, &self.envelope)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSealedFile = serde_json::from_str(json).map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::User,
                ErrorKind::MalformedEnvelope,
                format!("sealed file is malformed: {}", e),
                e,
            )
        })?;
        Ok(Self {
            salt: raw.salt,
            iterations: raw.iterations,
            envelope: Envelope::from_value(raw.envelope)?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            DocsealError::with_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to serialize sealed file",
                e,
            )
        })
    }
}

/// Seal a UTF-8 text file.
///
/// Reads plaintext from `input_path`, seals it with a passphrase from
/// `passphrase_reader`, and writes the sealed JSON to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn seal_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
    config: &Config,
) -> Result<()> {
    let plaintext = read_text(input_path)?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let sealed = SealedFile::seal(&plaintext, &passphrase, config)
        .map_err(|e| e.with_context("sealing failed"))?;
    let json = sealed.to_json()?;
    write_file_secure(output_path, json.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    info!(output = %output_path.display(), iterations = sealed.iterations, "sealed file");
    Ok(())
}

/// Open a sealed file.
///
/// Reads sealed JSON from `input_path`, opens it using a passphrase from
/// `passphrase_reader`, and writes the plaintext to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn open_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let sealed = SealedFile::from_json(&read_text(input_path)?)?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let plaintext = Zeroizing::new(
        sealed
            .open(&passphrase)
            .map_err(|e| e.with_context("failed to open"))?,
    );
    write_file_secure(output_path, plaintext.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Replace a sealed file with new plaintext under the same passphrase
///
/// This function:
/// 1. Opens the existing file at `crypt_path` to validate the passphrase
/// 2. Reads new plaintext from `plain_path`
/// 3. Seals the new plaintext with a fresh salt and `config.iterations`
/// 4. Atomically writes to `crypt_path` (tempfile + fsync + rename)
///
/// Either the old file or the new file exists afterwards, never a partial one.
/// The validation step prevents accidental passphrase changes.
pub fn reseal_file(
    plain_path: &Path,
    crypt_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
    config: &Config,
) -> Result<()> {
    let existing = SealedFile::from_json(&read_text(crypt_path)?)?;
    let passphrase = passphrase_reader.read_passphrase()?;

    // Validate passphrase by opening the existing file (discard plaintext)
    drop(Zeroizing::new(
        existing
            .open(&passphrase)
            .map_err(|e| e.with_context("failed to open"))?,
    ));

    let crypt_dir = match crypt_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(crypt_dir)
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to create tempfile", e))?;
    let new_plaintext = read_text(plain_path)?;
    let resealed = SealedFile::seal(&new_plaintext, &passphrase, config)
        .map_err(|e| e.with_context("sealing failed"))?;
    let json = resealed.to_json()?;

    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error(ErrorCategory::Internal, "failed to set tempfile permissions", e))?;
    }
    temp_file.persist(crypt_path).map_err(|e| {
        io_error(
            ErrorCategory::Internal,
            format!("failed to rename to target file {}", crypt_path.display()),
            e.error,
        )
    })?;
    info!(
        output = %crypt_path.display(),
        previous_iterations = existing.iterations,
        iterations = resealed.iterations,
        "resealed file"
    );
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        let category = if e.kind() == io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        io_error(category, format!("failed to read from {}", path.display()), e)
    })?;
    String::from_utf8(bytes).map_err(|e| {
        DocsealError::with_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("{} is not valid UTF-8", path.display()),
            e,
        )
    })
}

/// Write file with secure permissions (0o600 on Unix)
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| io_error(ErrorCategory::User, format!("failed to open {}", path.display()), e))?;

        file.write_all(contents)
            .map_err(|e| io_error(ErrorCategory::Internal, format!("failed to write {}", path.display()), e))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .map_err(|e| io_error(ErrorCategory::User, format!("failed to write {}", path.display()), e))?;
        Ok(())
    }
}

fn io_error(category: ErrorCategory, msg: impl Into<String>, err: io::Error) -> DocsealError {
    DocsealError::with_source(category, ErrorKind::Io, msg, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passphrase::ConstantPassphraseReader;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn test_config() -> Config {
        Config::default().with_iterations(1_000)
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("doc.json");
        let crypt_path = temp_dir.path().join("doc.json.sealed");
        let opened_path = temp_dir.path().join("opened.json");

        let plaintext = "{\"_id\":1,\"json\":{\"name\":\"carlos\"}}";
        fs::write(&plain_path, plaintext).unwrap();

        let mut reader = ConstantPassphraseReader::new("test password");
        seal_file(&plain_path, &crypt_path, &mut reader, &test_config()).unwrap();

        let sealed = SealedFile::from_json(&fs::read_to_string(&crypt_path).unwrap()).unwrap();
        assert_eq!(sealed.iterations, 1_000);
        assert_eq!(sealed.envelope.src, "docseal");
        assert_eq!(sealed.envelope.v, 1);

        let mut reader = ConstantPassphraseReader::new("test password");
        open_file(&crypt_path, &opened_path, &mut reader).unwrap();
        assert_eq!(fs::read_to_string(&opened_path).unwrap(), plaintext);
    }

    #[test]
    fn test_source_from_config() {
        let sealed = SealedFile::seal("x", "pw", &test_config().with_source("inventory")).unwrap();
        assert_eq!(sealed.envelope.src, "inventory");
        assert_eq!(sealed.open("pw").unwrap(), "x");
    }

    #[test]
    fn test_reseal_file() {
        let temp_dir = TempDir::new().unwrap();
        let plain1_path = temp_dir.path().join("plain1.txt");
        let plain2_path = temp_dir.path().join("plain2.txt");
        let crypt_path = temp_dir.path().join("doc.sealed");

        fs::write(&plain1_path, "Initial content").unwrap();
        let mut reader = ConstantPassphraseReader::new("test password");
        seal_file(&plain1_path, &crypt_path, &mut reader, &test_config()).unwrap();
        let before = SealedFile::from_json(&fs::read_to_string(&crypt_path).unwrap()).unwrap();

        fs::write(&plain2_path, "Updated content").unwrap();
        let config = test_config().with_iterations(2_000);
        let mut reader = ConstantPassphraseReader::new("test password");
        reseal_file(&plain2_path, &crypt_path, &mut reader, &config).unwrap();

        let after = SealedFile::from_json(&fs::read_to_string(&crypt_path).unwrap()).unwrap();
        assert_ne!(before.salt, after.salt);
        assert_eq!(after.iterations, 2_000);
        assert_eq!(after.open("test password").unwrap(), "Updated content");
    }

    #[test]
    fn test_reseal_with_wrong_passphrase_fails() {
        let temp_dir = TempDir::new().unwrap();
        let plain1_path = temp_dir.path().join("plain1.txt");
        let plain2_path = temp_dir.path().join("plain2.txt");
        let crypt_path = temp_dir.path().join("doc.sealed");

        fs::write(&plain1_path, "Initial").unwrap();
        let mut reader = ConstantPassphraseReader::new("correct password");
        seal_file(&plain1_path, &crypt_path, &mut reader, &test_config()).unwrap();
        let before = fs::read_to_string(&crypt_path).unwrap();

        fs::write(&plain2_path, "Updated").unwrap();
        let mut reader = ConstantPassphraseReader::new("wrong password");
        let result = reseal_file(&plain2_path, &crypt_path, &mut reader, &test_config());

        let err = result.expect_err("expected authentication failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
        assert_eq!(fs::read_to_string(&crypt_path).unwrap(), before);
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("doc.sealed");

        fs::write(&plain_path, "test").unwrap();

        let mut reader = ConstantPassphraseReader::new("test");
        seal_file(&plain_path, &crypt_path, &mut reader, &test_config()).unwrap();

        let metadata = fs::metadata(&crypt_path).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_open_wrong_passphrase() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("doc.sealed");
        let opened_path = temp_dir.path().join("opened.txt");

        fs::write(&plain_path, "secret").unwrap();

        let mut reader = ConstantPassphraseReader::new("correct");
        seal_file(&plain_path, &crypt_path, &mut reader, &test_config()).unwrap();

        let mut reader = ConstantPassphraseReader::new("wrong");
        let err = open_file(&crypt_path, &opened_path, &mut reader).expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::Decryption);
        assert!(!opened_path.exists());
    }

    #[test]
    fn test_non_utf8_input_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("binary.bin");
        let crypt_path = temp_dir.path().join("binary.sealed");
        fs::write(&plain_path, [0xffu8, 0x00, 0xfe]).unwrap();

        let mut reader = ConstantPassphraseReader::new("test");
        let err = seal_file(&plain_path, &crypt_path, &mut reader, &test_config())
            .expect_err("expected utf-8 error");
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_malformed_sealed_file() {
        let temp_dir = TempDir::new().unwrap();
        let crypt_path = temp_dir.path().join("doc.sealed");
        let opened_path = temp_dir.path().join("opened.txt");
        fs::write(&crypt_path, "{\"salt\":\"ab\",\"iterations\":1000}").unwrap();

        let mut reader = ConstantPassphraseReader::new("test");
        let err = open_file(&crypt_path, &opened_path, &mut reader).expect_err("expected failure");
        assert_eq!(err.kind, ErrorKind::MalformedEnvelope);
    }

    #[test]
    fn test_out_of_range_version_in_sealed_file() {
        for v in ["-1", "4294967296"] {
            let json = format!(
                "{{\"salt\":\"ab\",\"iterations\":1000,\"envelope\":{{\"ct\":\"AAAA\",\"iv\":\"00\",\"src\":\"x\",\"v\":{}}}}}",
                v
            );
            let err = SealedFile::from_json(&json).expect_err("expected version error");
            assert_eq!(err.kind, ErrorKind::UnsupportedVersion);
        }
    }

    #[test]
    fn test_missing_input_is_user_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut reader = ConstantPassphraseReader::new("test");
        let err = open_file(
            &temp_dir.path().join("absent"),
            &temp_dir.path().join("out"),
            &mut reader,
        )
        .expect_err("expected missing file");
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.category, ErrorCategory::User);
    }
}
