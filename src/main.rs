use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD};
use clap::{Parser, Subcommand};
use keyhold::config::{ConfiguredStorage, DEFAULT_STORAGE_KEY, data_dir};
use keyhold::{Backend, Config, KdfParams, KeyStore, SignatureAlgorithm, StorageErrorKind};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod auth;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn to_kdf_params(&self) -> Result<KdfParams> {
        let default = KdfParams::default();

        KdfParams::new(
            self.mem_cost_kib.unwrap_or(default.mem_cost_kib()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.parallelism.unwrap_or(default.parallelism()),
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "keyhold")]
#[command(
    version,
    about = "Encrypted key-value storage and signing backed by an offline key vault."
)]
struct Cli {
    /// Key store backend: vault or ephemeral
    #[arg(long, global = true, env = "KEYHOLD_BACKEND", default_value_t = Backend::Vault)]
    backend: Backend,

    /// Path to the key vault file
    #[arg(long, global = true, value_name = "PATH", env = "KEYHOLD_VAULT")]
    vault: Option<PathBuf>,

    /// Path to the encrypted data file
    #[arg(long, global = true, value_name = "PATH", env = "KEYHOLD_DATA")]
    data: Option<PathBuf>,

    /// Alias of the symmetric key protecting stored values
    #[arg(long, global = true, env = "KEYHOLD_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY)]
    storage_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates the key vault and its storage key
    Init {
        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Generates a new key in the vault
    #[command(arg_required_else_help = true)]
    Keygen {
        alias: String,
        /// Signature algorithm of the new key pair
        #[arg(long, default_value_t = SignatureAlgorithm::default(), conflicts_with = "symmetric")]
        algorithm: SignatureAlgorithm,
        /// Generate a symmetric encryption key instead of a key pair
        #[arg(long)]
        symmetric: bool,
    },

    /// Lists the keys held in the vault
    Keys,

    /// Deletes a key from the vault
    #[command(arg_required_else_help = true)]
    DeleteKey { alias: String },

    /// Stores a value under a key
    #[command(arg_required_else_help = true)]
    Put {
        key: String,
        value: String,
        /// Parse the value as JSON instead of storing it as a string
        #[arg(long)]
        json: bool,
    },

    /// Retrieves the value stored under a key
    #[command(arg_required_else_help = true)]
    Get {
        key: String,
        /// Copy to the clipboard instead of printing
        #[arg(long)]
        copy: bool,
        /// Seconds until the clipboard is cleared
        #[arg(long, default_value_t = 30, requires = "copy")]
        clear_after: u64,
    },

    /// Tells whether a value is stored under a key
    #[command(arg_required_else_help = true)]
    Contains { key: String },

    /// Removes the value stored under a key
    #[command(arg_required_else_help = true)]
    Remove { key: String },

    /// Prints every stored value that can be decrypted
    List,

    /// Removes every stored value
    Clear,

    /// Signs data with a key pair, printing a base64 signature
    #[command(arg_required_else_help = true)]
    Sign {
        alias: String,
        #[arg(id = "message", value_name = "DATA")]
        data: String,
    },

    /// Verifies a base64 signature over data
    #[command(arg_required_else_help = true)]
    Verify {
        alias: String,
        #[arg(id = "message", value_name = "DATA")]
        data: String,
        signature: String,
    },

    /// Prints the base64 public key of a key pair
    #[command(arg_required_else_help = true)]
    PublicKey { alias: String },

    /// Shows information about the vault
    Info,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        // The platform directory is only resolved when a path is left unset.
        let mut config = match (&self.vault, &self.data) {
            (Some(_), Some(_)) => Config::in_dir(PathBuf::new()),
            _ => Config::in_dir(data_dir()?),
        };
        if let Some(vault) = &self.vault {
            config.vault_path = vault.clone();
        }
        if let Some(data) = &self.data {
            config.data_path = data.clone();
        }
        config.backend = self.backend;
        config.storage_key = self.storage_key.clone();
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KEYHOLD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Cli::parse();
    let mut config = args.config()?;
    debug!(backend = %config.backend, vault = %config.vault_path.display(), "configuration resolved");

    match args.command {
        Commands::Init { argon2 } => {
            config.kdf = argon2.to_kdf_params()?;
            let password = auth::read_new_password()?;
            config.init_keystore(password)?;
            println!("vault initialized");
        }
        Commands::Keygen {
            alias,
            algorithm,
            symmetric,
        } => {
            let mut keys = open_keystore(&config)?;
            if symmetric {
                keys.generate_symmetric_key(&alias)?;
                println!("generated symmetric key '{alias}'");
            } else {
                let entry = keys.generate_key_pair(&alias, algorithm)?;
                println!("generated {} key pair '{}'", entry.algorithm(), entry.alias());
            }
            keys.save()?;
        }
        Commands::Keys => {
            let keys = open_keystore(&config)?;
            print_keys(&keys);
        }
        Commands::DeleteKey { alias } => {
            if alias == config.storage_key {
                bail!("refusing to delete the storage key '{alias}'; stored values would be lost");
            }
            let mut keys = open_keystore(&config)?;
            keys.delete(&alias)?;
            keys.save()?;
            println!("key '{alias}' deleted");
        }
        Commands::Put { key, value, json } => {
            let value = if json {
                serde_json::from_str(&value).context("value is not valid JSON")?
            } else {
                Value::String(value)
            };
            open_storage(&config)?.put(&key, &value)?;
            println!("stored '{key}'");
        }
        Commands::Get {
            key,
            copy,
            clear_after,
        } => {
            let value = match open_storage(&config)?.get::<Value>(&key) {
                Ok(value) => value,
                Err(e) if e.kind() == StorageErrorKind::NotFound => {
                    eprintln!("key not found");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e).context(format!("failed to read '{key}'")),
            };
            if copy {
                copy_to_clipboard(&render(&value), clear_after)?;
            } else {
                println!("{}", render(&value));
            }
        }
        Commands::Contains { key } => {
            if open_storage(&config)?.contains(&key)? {
                println!("yes");
            } else {
                println!("no");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Remove { key } => {
            open_storage(&config)?.remove(&key)?;
            println!("removed '{key}'");
        }
        Commands::List => {
            let report = open_storage(&config)?.get_all_with_report::<Value>()?;
            if report.values.is_empty() {
                println!("No values stored.");
            }
            for value in &report.values {
                println!("{}", render(value));
            }
            if report.skipped > 0 {
                eprintln!("{} record(s) could not be decrypted", report.skipped);
            }
        }
        Commands::Clear => {
            open_storage(&config)?.clear()?;
            println!("storage cleared");
        }
        Commands::Sign { alias, data } => {
            let keys = open_keystore(&config)?;
            let signature = keys.signer(&alias)?.sign(data.as_bytes())?;
            println!("{}", STANDARD.encode(signature));
        }
        Commands::Verify {
            alias,
            data,
            signature,
        } => {
            let signature = STANDARD
                .decode(signature.trim())
                .context("signature is not valid base64")?;
            let keys = open_keystore(&config)?;
            if keys.signer(&alias)?.verify(data.as_bytes(), &signature)? {
                println!("valid");
            } else {
                println!("invalid");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::PublicKey { alias } => {
            let keys = open_keystore(&config)?;
            let public_key = keys.signer(&alias)?.public_key()?;
            println!("{}", STANDARD.encode(public_key));
        }
        Commands::Info => {
            let keys = open_keystore(&config)?;
            println!("{}", keys.info());
            if config.backend == Backend::Vault {
                println!("Data:        {}", config.data_path.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_keystore(config: &Config) -> Result<KeyStore> {
    config.open_keystore(auth::read_password)
}

fn open_storage(config: &Config) -> Result<ConfiguredStorage> {
    let keys = open_keystore(config)?;
    config.open_storage(&keys)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_keys(keys: &KeyStore) {
    let entries = keys.entries();
    if entries.is_empty() {
        println!("No keys stored.");
        return;
    }

    let alias_width = entries
        .iter()
        .map(|e| e.alias.len())
        .chain(std::iter::once("Alias".len()))
        .max()
        .unwrap_or_default();

    let kind_width = entries
        .iter()
        .map(|e| e.kind.to_string().len())
        .chain(std::iter::once("Kind".len()))
        .max()
        .unwrap_or_default();

    println!("{:<alias_width$}  {:<kind_width$}  Created", "Alias", "Kind");
    println!("{:-<alias_width$}  {:-<kind_width$}  {:-<7}", "", "", "");

    for e in entries {
        println!(
            "{:<alias_width$}  {:<kind_width$}  {}",
            e.alias,
            e.kind.to_string(),
            e.created
        );
    }
}

/// Puts `value` on the clipboard and clears it after `clear_after` seconds or
/// on Ctrl+C, whichever comes first.
fn copy_to_clipboard(value: &str, clear_after: u64) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
    clipboard.set_text(value.to_owned())?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    println!("copied to clipboard; clearing in {clear_after}s (Ctrl+C clears now)");
    let _ = rx.recv_timeout(Duration::from_secs(clear_after));

    clipboard.clear()?;
    println!("clipboard cleared");
    Ok(())
}
