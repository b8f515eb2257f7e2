//! Cryptographic primitives and the key capabilities built on them.
//!
//! Provides authenticated encryption, password key derivation, the
//! [`KeyProvider`] and [`Signer`] capabilities, and the storage key digest.

pub mod aead;
pub mod digest;
pub mod kdf;
pub mod provider;
pub mod signer;

pub use digest::key_digest;
pub use kdf::{KdfParams, derive_key};
pub use provider::{KeyProvider, SoftwareKeyProvider};
pub use signer::{
    EcdsaSigner, Ed25519Signer, GatedSigner, KeyEntry, PresenceGate, SignatureAlgorithm, Signer,
};

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;
/// Length of a symmetric key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
