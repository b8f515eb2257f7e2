//! Asymmetric signing capability bound to one key entry.
//!
//! A [`Signer`] never exposes private material. Callers get signatures, a
//! verification verdict and the encoded public key:
//!
//! | algorithm                | signature          | public key             |
//! |--------------------------|--------------------|------------------------|
//! | `ecdsa-secp256k1-sha256` | ASN.1 DER          | SubjectPublicKeyInfo DER |
//! | `ed25519`                | 64 raw bytes       | 32 raw bytes           |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ed25519_dalek::Signer as _;
use k256::ecdsa::signature::{Signer as _, Verifier as _};
use k256::pkcs8::EncodePublicKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::aead::secure_random;
use crate::error::{BoxError, CryptoError, KeyError};

const ED25519_SECRET_LEN: usize = 32;
const ECDSA_SECRET_LEN: usize = 32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[default]
    #[serde(rename = "ecdsa-secp256k1-sha256")]
    EcdsaSecp256k1Sha256,
    #[serde(rename = "ed25519")]
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaSecp256k1Sha256 => "ecdsa-secp256k1-sha256",
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }

    /// Generate private material for a new key pair of this algorithm.
    pub(crate) fn generate_secret(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self {
            SignatureAlgorithm::Ed25519 => {
                let mut secret = Zeroizing::new(vec![0u8; ED25519_SECRET_LEN]);
                secure_random(&mut secret)?;
                Ok(secret)
            }
            SignatureAlgorithm::EcdsaSecp256k1Sha256 => loop {
                // zero and values >= the group order are not valid scalars
                let mut secret = Zeroizing::new(vec![0u8; ECDSA_SECRET_LEN]);
                secure_random(&mut secret)?;
                if k256::ecdsa::SigningKey::from_slice(&secret).is_ok() {
                    return Ok(secret);
                }
            },
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecdsa-secp256k1-sha256" | "ecdsa" | "secp256k1" => {
                Ok(SignatureAlgorithm::EcdsaSecp256k1Sha256)
            }
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            other => anyhow::bail!("unsupported signature algorithm: {other}"),
        }
    }
}

/// Opaque handle metadata for an asymmetric key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    alias: String,
    algorithm: SignatureAlgorithm,
}

impl KeyEntry {
    pub fn new(alias: impl Into<String>, algorithm: SignatureAlgorithm) -> Self {
        Self {
            alias: alias.into(),
            algorithm,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }
}

/// Signs and verifies with a private key that never leaves the key store.
///
/// `verify` answers `Ok(false)` for a signature that does not match, including
/// one that cannot even be parsed. `Err` is reserved for the key store itself
/// failing.
pub trait Signer: Send + Sync {
    fn entry(&self) -> &KeyEntry;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError>;

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError>;

    fn public_key(&self) -> Result<Vec<u8>, KeyError>;
}

impl<S: Signer + ?Sized> Signer for Box<S> {
    fn entry(&self) -> &KeyEntry {
        (**self).entry()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        (**self).sign(data)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        (**self).verify(data, signature)
    }

    fn public_key(&self) -> Result<Vec<u8>, KeyError> {
        (**self).public_key()
    }
}

impl<S: Signer + ?Sized> Signer for Arc<S> {
    fn entry(&self) -> &KeyEntry {
        (**self).entry()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        (**self).sign(data)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        (**self).verify(data, signature)
    }

    fn public_key(&self) -> Result<Vec<u8>, KeyError> {
        (**self).public_key()
    }
}

fn operation_error(entry: &KeyEntry, source: impl Into<BoxError>) -> KeyError {
    KeyError::Operation {
        alias: entry.alias.clone(),
        source: source.into(),
    }
}

/// Build the signer matching `entry`'s algorithm from stored private material.
pub(crate) fn from_material(entry: KeyEntry, secret: &[u8]) -> Result<Box<dyn Signer>, KeyError> {
    Ok(match entry.algorithm {
        SignatureAlgorithm::EcdsaSecp256k1Sha256 => Box::new(EcdsaSigner::new(entry, secret)?),
        SignatureAlgorithm::Ed25519 => Box::new(Ed25519Signer::new(entry, secret)?),
    })
}

/// ECDSA over secp256k1 with SHA-256.
pub struct EcdsaSigner {
    entry: KeyEntry,
    key: k256::ecdsa::SigningKey,
}

impl EcdsaSigner {
    pub(crate) fn new(entry: KeyEntry, secret: &[u8]) -> Result<Self, KeyError> {
        let key = k256::ecdsa::SigningKey::from_slice(secret)
            .map_err(|_| KeyError::InvalidMaterial(entry.alias.clone()))?;
        Ok(Self { entry, key })
    }
}

impl Signer for EcdsaSigner {
    fn entry(&self) -> &KeyEntry {
        &self.entry
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        let signature: k256::ecdsa::Signature = self
            .key
            .try_sign(data)
            .map_err(|e| operation_error(&self.entry, e))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        let Ok(signature) = k256::ecdsa::Signature::from_der(signature) else {
            return Ok(false);
        };
        Ok(self.key.verifying_key().verify(data, &signature).is_ok())
    }

    fn public_key(&self) -> Result<Vec<u8>, KeyError> {
        let public = k256::PublicKey::from(self.key.verifying_key());
        let der = public
            .to_public_key_der()
            .map_err(|e| operation_error(&self.entry, e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }
}

impl fmt::Debug for EcdsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaSigner")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

pub struct Ed25519Signer {
    entry: KeyEntry,
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    pub(crate) fn new(entry: KeyEntry, secret: &[u8]) -> Result<Self, KeyError> {
        let secret: &[u8; ED25519_SECRET_LEN] = secret
            .try_into()
            .map_err(|_| KeyError::InvalidMaterial(entry.alias.clone()))?;
        Ok(Self {
            entry,
            key: ed25519_dalek::SigningKey::from_bytes(secret),
        })
    }
}

impl Signer for Ed25519Signer {
    fn entry(&self) -> &KeyEntry {
        &self.entry
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        let signature: ed25519_dalek::Signature = self
            .key
            .try_sign(data)
            .map_err(|e| operation_error(&self.entry, e))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(self
            .key
            .verifying_key()
            .verify_strict(data, &signature)
            .is_ok())
    }

    fn public_key(&self) -> Result<Vec<u8>, KeyError> {
        Ok(self.key.verifying_key().to_bytes().to_vec())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Approval step in front of a private key operation, e.g. a user-presence
/// or biometric prompt.
pub trait PresenceGate: Send + Sync {
    fn approve(&self, entry: &KeyEntry) -> Result<(), BoxError>;
}

impl<F> PresenceGate for F
where
    F: Fn(&KeyEntry) -> Result<(), BoxError> + Send + Sync,
{
    fn approve(&self, entry: &KeyEntry) -> Result<(), BoxError> {
        self(entry)
    }
}

/// Wraps a signer so that `sign` must pass a [`PresenceGate`] first.
/// Verification and public key export use only public material and are not
/// gated.
pub struct GatedSigner<S, G> {
    inner: S,
    gate: G,
}

impl<S: Signer, G: PresenceGate> GatedSigner<S, G> {
    pub fn new(inner: S, gate: G) -> Self {
        Self { inner, gate }
    }
}

impl<S: Signer, G: PresenceGate> Signer for GatedSigner<S, G> {
    fn entry(&self) -> &KeyEntry {
        self.inner.entry()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.gate
            .approve(self.inner.entry())
            .map_err(|e| operation_error(self.inner.entry(), e))?;
        self.inner.sign(data)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        self.inner.verify(data, signature)
    }

    fn public_key(&self) -> Result<Vec<u8>, KeyError> {
        self.inner.public_key()
    }
}
