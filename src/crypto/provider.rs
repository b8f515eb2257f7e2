//! Symmetric encryption capability bound to one protected key.

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use super::{KEY_LEN, aead};
use crate::error::CryptoError;

/// Encrypts and decrypts under a key the caller never sees.
///
/// `encrypt` output is self-describing: everything `decrypt` needs besides the
/// key travels inside the returned bytes. Encryption is randomized, so two
/// ciphertexts of the same plaintext are generally different.
pub trait KeyProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

impl<P: KeyProvider + ?Sized> KeyProvider for Box<P> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        (**self).decrypt(ciphertext)
    }
}

impl<P: KeyProvider + ?Sized> KeyProvider for Arc<P> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        (**self).decrypt(ciphertext)
    }
}

/// XChaCha20-Poly1305 provider over a key held by the software vault.
pub struct SoftwareKeyProvider {
    alias: String,
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl SoftwareKeyProvider {
    pub(crate) fn new(alias: impl Into<String>, key: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self {
            alias: alias.into(),
            key,
        }
    }

    /// A provider over a freshly generated key that lives only as long as the
    /// provider itself.
    pub fn ephemeral(alias: impl Into<String>) -> Result<Self, CryptoError> {
        Ok(Self::new(alias, aead::generate_key()?))
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl fmt::Debug for SoftwareKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeyProvider")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl KeyProvider for SoftwareKeyProvider {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::seal(&self.key, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        aead::open(&self.key, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let provider = SoftwareKeyProvider::ephemeral("storage").unwrap();
        let ct = provider.encrypt(b"hello").unwrap();
        assert_ne!(ct.as_slice(), b"hello");
        assert_eq!(provider.decrypt(&ct).unwrap().as_slice(), b"hello");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let provider = SoftwareKeyProvider::ephemeral("storage").unwrap();
        let ct = provider.encrypt(b"").unwrap();
        assert!(provider.decrypt(&ct).unwrap().is_empty());
    }

    #[test]
    fn foreign_key_is_rejected() {
        let a = SoftwareKeyProvider::ephemeral("a").unwrap();
        let b = SoftwareKeyProvider::ephemeral("b").unwrap();
        let ct = a.encrypt(b"hello").unwrap();
        assert!(matches!(b.decrypt(&ct), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn debug_does_not_print_key() {
        let provider = SoftwareKeyProvider::new("storage", Zeroizing::new([0xAB; KEY_LEN]));
        let dbg = format!("{provider:?}");
        assert!(dbg.contains("storage"));
        assert!(!dbg.contains("171"));
        assert!(!dbg.to_lowercase().contains("ab, ab"));
    }

    #[test]
    fn shared_provider_works_through_arc() {
        let provider: Arc<dyn KeyProvider> = Arc::new(SoftwareKeyProvider::ephemeral("s").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || {
                    let msg = format!("message {i}");
                    let ct = provider.encrypt(msg.as_bytes()).unwrap();
                    assert_eq!(provider.decrypt(&ct).unwrap().as_slice(), msg.as_bytes());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
