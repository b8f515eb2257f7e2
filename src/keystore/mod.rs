//! Software key store.
//!
//! Holds named symmetric keys and signing key pairs. A persistent store is a
//! vault file sealed with XChaCha20-Poly1305 under an Argon2id key derived
//! from a password; an ephemeral store lives only in memory. Key material is
//! reachable only through the handles it hands out:
//! [`SoftwareKeyProvider`] and [`Signer`].

mod entry;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use zeroize::Zeroizing;

pub use entry::{KeyInfo, KeyKind};

use crate::atomic::AtomicFile;
use crate::crypto::{
    KEY_LEN, KdfParams, KeyEntry, SALT_LEN, SignatureAlgorithm, Signer, SoftwareKeyProvider,
    aead, derive_key, signer,
};
use crate::error::{CryptoError, KeyError, KeyStoreError};
use crate::format::{self, VaultFile};
use entry::{KeyTable, StoredKey};

/// Where and how a persistent store is sealed.
struct Vault {
    file: AtomicFile,
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
}

pub struct KeyStore {
    table: KeyTable,
    vault: Option<Vault>,
}

impl KeyStore {
    /// Creates a new, empty vault file. Fails if the file already exists.
    pub fn init(password: Zeroizing<String>, file: AtomicFile, kdf: KdfParams) -> Result<Self> {
        if file.exists() {
            bail!("vault already exists at {}", file.path().display());
        }

        let salt = aead::generate_salt()?;
        let key = derive_key(&password, &salt, kdf).context("failed to derive vault key")?;
        drop(password);

        let store = Self {
            table: KeyTable::new(),
            vault: Some(Vault {
                file,
                key,
                salt,
                kdf,
            }),
        };
        store.save()?;
        info!(path = ?store.path(), "vault initialized");
        Ok(store)
    }

    /// Opens an existing vault file.
    pub fn open(password: Zeroizing<String>, file: AtomicFile) -> Result<Self> {
        if !file.exists() {
            bail!("vault does not exist at {}", file.path().display());
        }

        let data = file.load()?;
        let parsed = format::parse(&data)?;

        let key = derive_key(&password, &parsed.salt, parsed.kdf)
            .context("unable to derive vault key")?;
        drop(password);

        let plaintext = aead::decrypt(&key, &parsed.nonce, &parsed.ciphertext)
            .context("invalid password or corrupted vault")?;
        let table: KeyTable = serde_json::from_slice(&plaintext)
            .context("failed to deserialize key table; vault is corrupted")?;

        debug!(keys = table.keys.len(), "vault opened");
        Ok(Self {
            table,
            vault: Some(Vault {
                file,
                key,
                salt: parsed.salt,
                kdf: parsed.kdf,
            }),
        })
    }

    /// A store that exists only in memory. Keys generated here vanish with it.
    pub fn ephemeral() -> Self {
        Self {
            table: KeyTable::new(),
            vault: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.vault.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.vault.as_ref().map(|v| v.file.path())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.table.keys.contains_key(alias)
    }

    pub fn generate_symmetric_key(&mut self, alias: &str) -> Result<(), KeyStoreError> {
        self.ensure_free(alias)?;
        let key = aead::generate_key()?;
        self.insert(alias, KeyKind::Symmetric, Zeroizing::new(key.to_vec()));
        Ok(())
    }

    pub fn generate_key_pair(
        &mut self,
        alias: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<KeyEntry, KeyStoreError> {
        self.ensure_free(alias)?;
        let secret = algorithm.generate_secret()?;
        self.insert(alias, KeyKind::Signing { algorithm }, secret);
        Ok(KeyEntry::new(alias, algorithm))
    }

    /// Handle for the symmetric key `alias`.
    pub fn key_provider(&self, alias: &str) -> Result<SoftwareKeyProvider, CryptoError> {
        let unavailable = || CryptoError::KeyUnavailable(alias.to_owned());
        let stored = self.table.keys.get(alias).ok_or_else(unavailable)?;
        if stored.kind() != KeyKind::Symmetric {
            return Err(unavailable());
        }
        let key: [u8; KEY_LEN] = stored.secret().try_into().map_err(|_| unavailable())?;
        Ok(SoftwareKeyProvider::new(alias, Zeroizing::new(key)))
    }

    /// Handle for the signing key pair `alias`.
    pub fn signer(&self, alias: &str) -> Result<Box<dyn Signer>, KeyError> {
        let stored = self
            .table
            .keys
            .get(alias)
            .ok_or_else(|| KeyError::NotFound(alias.to_owned()))?;
        let KeyKind::Signing { algorithm } = stored.kind() else {
            return Err(KeyError::WrongKind(alias.to_owned()));
        };
        signer::from_material(KeyEntry::new(alias, algorithm), stored.secret())
    }

    pub fn delete(&mut self, alias: &str) -> Result<(), KeyStoreError> {
        if self.table.keys.remove(alias).is_none() {
            return Err(KeyStoreError::AliasNotFound(alias.to_owned()));
        }
        info!(alias, "key deleted");
        Ok(())
    }

    pub fn entries(&self) -> Vec<KeyInfo> {
        self.table
            .keys
            .iter()
            .map(|(alias, stored)| stored.info(alias))
            .collect()
    }

    pub fn info(&self) -> KeyStoreInfo {
        KeyStoreInfo {
            path: self.path().map(|p| p.display().to_string()),
            version: format::CURRENT_VERSION,
            kdf: self.vault.as_ref().map(|v| v.kdf),
            keys: self.table.keys.len(),
            created: self.table.created.clone(),
        }
    }

    /// Reseals the key table with a fresh nonce and atomically replaces the
    /// vault file. A no-op for ephemeral stores.
    pub fn save(&self) -> Result<()> {
        let Some(vault) = &self.vault else {
            return Ok(());
        };

        let plaintext = Zeroizing::new(serde_json::to_vec(&self.table)?);
        let (ciphertext, nonce) = aead::encrypt(&vault.key, &plaintext)?;

        let file = VaultFile::current(vault.kdf, vault.salt, nonce, ciphertext);
        vault.file.save(&format::serialize(&file)?)?;
        debug!(keys = self.table.keys.len(), "vault saved");
        Ok(())
    }

    fn ensure_free(&self, alias: &str) -> Result<(), KeyStoreError> {
        if self.contains(alias) {
            return Err(KeyStoreError::AliasExists(alias.to_owned()));
        }
        Ok(())
    }

    fn insert(&mut self, alias: &str, kind: KeyKind, secret: Zeroizing<Vec<u8>>) {
        self.table
            .keys
            .insert(alias.to_owned(), StoredKey::new(kind, secret));
        info!(alias, kind = %kind, "key generated");
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("path", &self.path())
            .field("keys", &self.table.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Summary shown by `keyhold info`.
#[derive(Debug, Clone)]
pub struct KeyStoreInfo {
    pub path: Option<String>,
    pub version: u8,
    pub kdf: Option<KdfParams>,
    pub keys: usize,
    pub created: String,
}

impl fmt::Display for KeyStoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => writeln!(f, "Vault:       {path}")?,
            None => writeln!(f, "Vault:       (ephemeral)")?,
        }
        writeln!(f, "Version:     {}", self.version)?;
        if let Some(kdf) = &self.kdf {
            writeln!(
                f,
                "KDF:         argon2id (mem {} KiB, time {}, parallelism {})",
                kdf.mem_cost_kib(),
                kdf.time_cost(),
                kdf.parallelism()
            )?;
        }
        writeln!(f, "Keys:        {}", self.keys)?;
        write!(f, "Created:     {}", self.created)
    }
}
