//! Runtime configuration: which key store backend to use and where things live.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use zeroize::Zeroizing;

use crate::atomic::AtomicFile;
use crate::crypto::{KdfParams, SoftwareKeyProvider};
use crate::encrypted::EncryptedStorage;
use crate::keystore::KeyStore;
use crate::substrate::{FileSubstrate, MemorySubstrate, Substrate};

pub const DEFAULT_STORAGE_KEY: &str = "storage";

const VAULT_FILE: &str = "vault.khld";
const DATA_FILE: &str = "data.json";

/// Key store backend, chosen explicitly at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Password-protected vault file; data persisted in a file substrate.
    #[default]
    Vault,
    /// Keys generated per process, data kept in memory.
    Ephemeral,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vault" => Ok(Backend::Vault),
            "ephemeral" | "memory" => Ok(Backend::Ephemeral),
            other => bail!("unknown backend '{other}' (expected 'vault' or 'ephemeral')"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Vault => f.write_str("vault"),
            Backend::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

/// Storage wired to the configured backend.
pub type ConfiguredStorage = EncryptedStorage<SoftwareKeyProvider, Box<dyn Substrate>>;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    pub vault_path: PathBuf,
    pub data_path: PathBuf,
    pub storage_key: String,
    pub kdf: KdfParams,
}

impl Config {
    /// Configuration rooted in the platform data directory.
    pub fn with_defaults() -> Result<Self> {
        let dir = data_dir()?;
        Ok(Self::in_dir(dir))
    }

    /// Configuration with vault and data files inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            backend: Backend::default(),
            vault_path: dir.join(VAULT_FILE),
            data_path: dir.join(DATA_FILE),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            kdf: KdfParams::default(),
        }
    }

    /// Creates the vault and its storage key.
    pub fn init_keystore(&self, password: Zeroizing<String>) -> Result<KeyStore> {
        if self.backend == Backend::Ephemeral {
            bail!("the ephemeral backend has nothing to initialize");
        }
        let mut store = KeyStore::init(password, AtomicFile::new(&self.vault_path), self.kdf)?;
        store.generate_symmetric_key(&self.storage_key)?;
        store.save()?;
        Ok(store)
    }

    /// Opens the configured key store. `password` is only consulted by the
    /// vault backend.
    pub fn open_keystore<F>(&self, password: F) -> Result<KeyStore>
    where
        F: FnOnce() -> Result<Zeroizing<String>>,
    {
        match self.backend {
            Backend::Vault => KeyStore::open(password()?, AtomicFile::new(&self.vault_path)),
            Backend::Ephemeral => {
                let mut store = KeyStore::ephemeral();
                store.generate_symmetric_key(&self.storage_key)?;
                Ok(store)
            }
        }
    }

    /// Encrypted storage over the backend's substrate, keyed by the storage key.
    pub fn open_storage(&self, keystore: &KeyStore) -> Result<ConfiguredStorage> {
        let provider = keystore
            .key_provider(&self.storage_key)
            .with_context(|| format!("storage key '{}' missing from key store", self.storage_key))?;
        let substrate: Box<dyn Substrate> = match self.backend {
            Backend::Vault => Box::new(FileSubstrate::open(&self.data_path)?),
            Backend::Ephemeral => Box::new(MemorySubstrate::new()),
        };
        Ok(EncryptedStorage::new(provider, substrate))
    }
}

pub fn data_dir() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "keyhold").context("could not determine platform directories")?;
    Ok(project_dirs.data_dir().to_path_buf())
}
