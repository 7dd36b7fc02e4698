//! docseal CLI - seal and open JSON documents with a passphrase
//!
//! Documents are sealed into versioned encryption envelopes using
//! PBKDF2-HMAC-SHA256 key derivation and XSalsa20Poly1305.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use docseal::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use docseal::{Config, kdf, random};
use docseal::{envelope, file_ops};

#[derive(Parser)]
#[command(name = "docseal")]
#[command(version)]
#[command(about = "Passphrase-based encryption envelopes for JSON documents.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// PBKDF2 iteration count used when sealing
    #[arg(long, global = true, env = "DOCSEAL_ITERATIONS", default_value_t = kdf::DEFAULT_ITERATIONS)]
    iterations: u32,

    /// Provenance tag written into the envelope's `src` field
    #[arg(long, global = true, env = "DOCSEAL_SOURCE", default_value = envelope::DEFAULT_SOURCE)]
    source: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print securely generated random bytes as hex
    Random {
        /// Number of random bytes to generate
        #[arg(short, long, default_value_t = 32)]
        bytes: usize,
    },

    /// Derive a hex key from the passphrase and a salt
    DeriveKey {
        /// Salt mixed into the derivation; generated when omitted
        #[arg(short, long)]
        salt: Option<String>,
    },

    /// Seal a UTF-8 document into an envelope file
    #[command(alias = "s")]
    Seal {
        /// Path to the document to seal
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the sealed file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Open a sealed file
    #[command(alias = "o")]
    Open {
        /// Path to the sealed file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the opened document to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Replace a sealed file with new content, while validating
    /// that the passphrase is not accidentally changed.
    #[command(alias = "r")]
    Reseal {
        /// Path to the document to seal
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the existing sealed file to replace
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "docseal=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::default()
        .with_iterations(cli.iterations)
        .with_source(cli.source);

    let result = match cli.command {
        Commands::Random { bytes } => {
            random::generate_random_string(bytes).map(|s| println!("{}", s))
        }
        Commands::DeriveKey { salt } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            derive_key(&mut *reader, salt, config.iterations)
        }
        Commands::Seal { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            file_ops::seal_file(&input, &output, &mut *reader, &config)
        }
        Commands::Open { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            file_ops::open_file(&input, &output, &mut *reader)
        }
        Commands::Reseal { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            file_ops::reseal_file(&input, &output, &mut *reader, &config)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e.chain_message());
        process::exit(1);
    }
}

/// Prints `salt` and `key` on separate lines so a generated salt can be kept.
fn derive_key(
    reader: &mut dyn PassphraseReader,
    salt: Option<String>,
    iterations: u32,
) -> docseal::Result<()> {
    let salt = match salt {
        Some(salt) => salt,
        None => kdf::generate_salt()?,
    };
    let passphrase = reader.read_passphrase()?;
    let key = kdf::derive_key(&passphrase, &salt, iterations)?;
    println!("salt {}", salt);
    println!("key {}", key);
    Ok(())
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}
