//! Error types surfaced by the storage and signing layers.

use thiserror::Error;

/// Boxed error used to carry the underlying cause across layers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A value could not be converted to or from bytes.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("value could not be encoded: {0}")]
    Encode(#[source] BoxError),
    #[error("data does not decode into the requested type: {0}")]
    Decode(#[source] BoxError),
}

/// Symmetric encrypt/decrypt fault.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("OS random generator unavailable")]
    RandomUnavailable,
    #[error("symmetric key '{0}' unavailable")]
    KeyUnavailable(String),
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext too short ({0} bytes)")]
    Truncated(usize),
    #[error("decryption failed: wrong key or corrupted data")]
    Decrypt,
}

/// Asymmetric key fault. A signature that simply does not verify is not a
/// `KeyError`.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key entry '{0}' not found")]
    NotFound(String),
    #[error("key entry '{0}' is not a signing key")]
    WrongKind(String),
    #[error("key entry '{0}' holds invalid key material")]
    InvalidMaterial(String),
    #[error("key operation on '{alias}' failed: {source}")]
    Operation {
        alias: String,
        #[source]
        source: BoxError,
    },
}

/// Provisioning failure inside the key store.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key '{0}' already exists")]
    AliasExists(String),
    #[error("key '{0}' not found")]
    AliasNotFound(String),
    #[error("key generation failed: {0}")]
    Generation(#[from] CryptoError),
}

/// Failure reported by a persistent substrate.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("substrate I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("substrate contents are corrupted: {0}")]
    Corrupted(#[from] serde_json::Error),
    #[error("substrate failure: {0}")]
    Other(#[from] anyhow::Error),
}

/// The only error type observed by callers of
/// [`EncryptedStorage`](crate::EncryptedStorage).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no value stored under this key")]
    NotFound,
    #[error("could not serialize value")]
    Serialization(#[from] SerializationError),
    #[error("could not decrypt value")]
    Crypto(#[from] CryptoError),
    #[error("stored value is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("substrate failure")]
    Substrate(#[from] SubstrateError),
}

/// Coarse classification of a [`StorageError`] for callers deciding between
/// reset and bug report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    /// Stored bytes exist but cannot be decoded or decrypted; usually
    /// corruption or a rotated key.
    Undecodable,
    /// Value could not be serialized or deserialized into the requested type.
    Unserializable,
    Substrate,
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::NotFound => StorageErrorKind::NotFound,
            StorageError::Crypto(_) | StorageError::Encoding(_) => StorageErrorKind::Undecodable,
            StorageError::Serialization(_) => StorageErrorKind::Unserializable,
            StorageError::Substrate(_) => StorageErrorKind::Substrate,
        }
    }
}
