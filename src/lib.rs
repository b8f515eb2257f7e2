//! Key-backed encrypted storage and signing.
//!
//! [`EncryptedStorage`] persists typed values encrypted under a
//! [`KeyProvider`] into any [`Substrate`], hiding logical key names behind
//! [`key_digest`]. [`Signer`] proves possession of a private key without
//! exposing it. [`KeyStore`] is the software key store that provisions both
//! kinds of key and hands out the opaque handles.
//!
//! ```no_run
//! use keyhold::{EncryptedStorage, KeyStore, MemorySubstrate, SignatureAlgorithm};
//!
//! let mut keys = KeyStore::ephemeral();
//! keys.generate_symmetric_key("storage")?;
//! keys.generate_key_pair("device", SignatureAlgorithm::Ed25519)?;
//!
//! let storage = EncryptedStorage::new(keys.key_provider("storage")?, MemorySubstrate::new());
//! storage.put("user.token", "abc123")?;
//! let token: String = storage.get("user.token")?;
//!
//! let signer = keys.signer("device")?;
//! let signature = signer.sign(token.as_bytes())?;
//! assert!(signer.verify(token.as_bytes(), &signature)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod atomic;
pub mod config;
pub mod crypto;
mod encrypted;
pub mod error;
pub(crate) mod format;
pub mod keystore;
mod serializer;
pub mod substrate;

pub use crate::atomic::AtomicFile;
pub use crate::config::{Backend, Config};
pub use crate::crypto::{
    GatedSigner, KdfParams, KeyEntry, KeyProvider, PresenceGate, SignatureAlgorithm, Signer,
    SoftwareKeyProvider, key_digest,
};
pub use crate::encrypted::{EncryptedStorage, Enumeration};
pub use crate::error::{
    CryptoError, KeyError, KeyStoreError, SerializationError, StorageError, StorageErrorKind,
    SubstrateError,
};
pub use crate::keystore::{KeyInfo, KeyKind, KeyStore};
pub use crate::serializer::{JsonSerializer, Serializer};
pub use crate::substrate::{FileSubstrate, MemorySubstrate, Substrate};
