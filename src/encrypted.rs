//! Typed, encrypted map over a [`Substrate`].
//!
//! Each record is stored as
//!
//! ```text
//! key_digest(logical key) -> base64(KeyProvider::encrypt(Serializer::to_bytes(value)))
//! ```
//!
//! Neither the logical key nor the plaintext ever reaches the substrate.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::crypto::{KeyProvider, key_digest};
use crate::error::StorageError;
use crate::serializer::{JsonSerializer, Serializer};
use crate::substrate::Substrate;

/// Result of a best-effort bulk read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration<T> {
    /// Records that decoded into the requested type.
    pub values: Vec<T>,
    /// Records that could not be decoded, decrypted or deserialized.
    pub skipped: usize,
}

/// Typed map whose values are sealed by a [`KeyProvider`] before they reach
/// the substrate `B`.
pub struct EncryptedStorage<P, B, S = JsonSerializer> {
    provider: P,
    substrate: B,
    serializer: S,
}

impl<P: KeyProvider, B: Substrate> EncryptedStorage<P, B> {
    /// Storage using the JSON serializer.
    pub fn new(provider: P, substrate: B) -> Self {
        Self::with_serializer(provider, substrate, JsonSerializer)
    }
}

impl<P: KeyProvider, B: Substrate, S: Serializer> EncryptedStorage<P, B, S> {
    /// Storage with a custom value encoding.
    pub fn with_serializer(provider: P, substrate: B, serializer: S) -> Self {
        Self {
            provider,
            substrate,
            serializer,
        }
    }

    /// The backing substrate, holding digests and ciphertext only.
    pub fn substrate(&self) -> &B {
        &self.substrate
    }

    /// Serializes, encrypts and stores `value`, replacing any previous record.
    /// Nothing is written if serialization or encryption fails.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let digest = key_digest(key);
        let plaintext = zeroize::Zeroizing::new(self.serializer.to_bytes(value)?);
        let ciphertext = self.provider.encrypt(&plaintext)?;
        self.substrate
            .set_string(&digest, &STANDARD.encode(ciphertext))?;
        debug!(digest = %digest, "stored record");
        Ok(())
    }

    /// Reads the record stored under `key`; [`StorageError::NotFound`] if absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        let digest = key_digest(key);
        let encoded = self
            .substrate
            .get_string(&digest)?
            .ok_or(StorageError::NotFound)?;
        self.decode(&encoded)
    }

    /// Every record that decodes as `T`. Records that do not (another type, a
    /// foreign key, corruption) are left out without error.
    pub fn get_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StorageError> {
        Ok(self.get_all_with_report()?.values)
    }

    /// Like [`get_all`](Self::get_all), also reporting how many records were
    /// skipped. Failure to enumerate the substrate itself is still an error.
    pub fn get_all_with_report<T: DeserializeOwned>(&self) -> Result<Enumeration<T>, StorageError> {
        let entries = self.substrate.all_entries()?;
        let mut values = Vec::with_capacity(entries.len());
        let mut skipped = 0;

        for (digest, encoded) in &entries {
            match self.decode(encoded) {
                Ok(value) => values.push(value),
                Err(e) => {
                    skipped += 1;
                    debug!(digest = %digest, error = %e, "skipping record");
                }
            }
        }

        if skipped > 0 {
            debug!(
                decoded = values.len(),
                skipped, "enumeration skipped undecodable records"
            );
        }
        Ok(Enumeration { values, skipped })
    }

    /// Existence check only; the record is not decrypted.
    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.substrate.contains(&key_digest(key))?)
    }

    /// Deletes the record under `key`. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let digest = key_digest(key);
        self.substrate.remove(&digest)?;
        debug!(digest = %digest, "removed record");
        Ok(())
    }

    /// Deletes every record in the substrate.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.substrate.clear()?;
        debug!("cleared storage");
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, encoded: &str) -> Result<T, StorageError> {
        // line-wrapped base64 from other writers is accepted
        let ciphertext = if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
            let compact: String = encoded.split_ascii_whitespace().collect();
            STANDARD.decode(compact)?
        } else {
            STANDARD.decode(encoded)?
        };
        let plaintext = self.provider.decrypt(&ciphertext)?;
        Ok(self.serializer.from_bytes(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SoftwareKeyProvider;
    use crate::error::{CryptoError, StorageErrorKind, SubstrateError};
    use std::collections::BTreeMap;
    use zeroize::Zeroizing;
    use crate::substrate::MemorySubstrate;
    use serde::Deserialize;

    fn storage() -> EncryptedStorage<SoftwareKeyProvider, MemorySubstrate> {
        EncryptedStorage::new(
            SoftwareKeyProvider::ephemeral("storage").unwrap(),
            MemorySubstrate::new(),
        )
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Factor {
        sid: String,
        account: String,
    }

    #[test]
    fn put_then_get() {
        let storage = storage();
        storage.put("user.token", "abc123").unwrap();
        let value: String = storage.get("user.token").unwrap();
        assert_eq!(value, "abc123");
    }

    #[test]
    fn substrate_key_is_digest_and_value_is_not_plaintext() {
        let storage = storage();
        storage.put("user.token", "abc123").unwrap();

        let entries = storage.substrate().all_entries().unwrap();
        let (key, value) = entries.iter().next().unwrap();
        assert_eq!(key, "134nSH0WfyW4dOvkwygWPJ1YeAGXq/01vGyPgKgbb0g=");
        assert!(!value.contains("abc123"));
        assert!(STANDARD.decode(value).is_ok());
    }

    #[test]
    fn put_overwrites() {
        let storage = storage();
        storage.put("k", &1u32).unwrap();
        storage.put("k", &2u32).unwrap();
        assert_eq!(storage.get::<u32>("k").unwrap(), 2);
        assert_eq!(storage.substrate().len(), 1);
    }

    #[test]
    fn missing_key_is_not_found() {
        let err = storage().get::<String>("absent").unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }

    #[test]
    fn wrong_type_is_unserializable() {
        let storage = storage();
        storage.put("k", "text").unwrap();
        let err = storage.get::<Factor>("k").unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Unserializable);
    }

    #[test]
    fn tampered_ciphertext_is_crypto_error() {
        let storage = storage();
        storage.put("k", "value").unwrap();

        let digest = key_digest("k");
        let encoded = storage.substrate().get_string(&digest).unwrap().unwrap();
        let mut bytes = STANDARD.decode(encoded).unwrap();
        for bit in 0..8 {
            let mut tampered = bytes.clone();
            let idx = tampered.len() / 2;
            tampered[idx] ^= 1 << bit;
            storage
                .substrate()
                .set_string(&digest, &STANDARD.encode(&tampered))
                .unwrap();
            let err = storage.get::<String>("k").unwrap_err();
            assert!(matches!(err, StorageError::Crypto(CryptoError::Decrypt)));
        }

        bytes[0] ^= 0x80;
        storage
            .substrate()
            .set_string(&digest, &STANDARD.encode(&bytes))
            .unwrap();
        assert!(matches!(
            storage.get::<String>("k"),
            Err(StorageError::Crypto(_))
        ));
    }

    #[test]
    fn invalid_base64_is_encoding_error() {
        let storage = storage();
        storage
            .substrate()
            .set_string(&key_digest("k"), "***")
            .unwrap();
        let err = storage.get::<String>("k").unwrap_err();
        assert!(matches!(err, StorageError::Encoding(_)));
        assert_eq!(err.kind(), StorageErrorKind::Undecodable);
    }

    #[test]
    fn line_wrapped_base64_is_accepted() {
        let storage = storage();
        storage.put("k", &"x".repeat(100)).unwrap();

        let digest = key_digest("k");
        let encoded = storage.substrate().get_string(&digest).unwrap().unwrap();
        let wrapped: String = encoded
            .as_bytes()
            .chunks(76)
            .map(|c| format!("{}\n", std::str::from_utf8(c).unwrap()))
            .collect();
        storage.substrate().set_string(&digest, &wrapped).unwrap();

        assert_eq!(storage.get::<String>("k").unwrap(), "x".repeat(100));
    }

    #[test]
    fn get_all_skips_other_types_and_foreign_keys() {
        let storage = storage();
        storage.put("a", "first").unwrap();
        storage.put("b", "second").unwrap();
        storage
            .put(
                "factor",
                &Factor {
                    sid: "YF1".into(),
                    account: "acme".into(),
                },
            )
            .unwrap();

        let foreign = SoftwareKeyProvider::ephemeral("other").unwrap();
        let sealed = foreign.encrypt(b"\"foreign\"").unwrap();
        storage
            .substrate()
            .set_string(&key_digest("foreign"), &STANDARD.encode(sealed))
            .unwrap();

        let report = storage.get_all_with_report::<String>().unwrap();
        let mut values = report.values;
        values.sort();
        assert_eq!(values, vec!["first", "second"]);
        assert_eq!(report.skipped, 2);

        let factors: Vec<Factor> = storage.get_all().unwrap();
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].sid, "YF1");
    }

    #[test]
    fn contains_remove_clear() {
        let storage = storage();
        storage.put("k", "v").unwrap();
        assert!(storage.contains("k").unwrap());

        storage.remove("k").unwrap();
        storage.remove("k").unwrap();
        assert!(!storage.contains("k").unwrap());

        storage.put("k", "v").unwrap();
        storage.clear().unwrap();
        assert!(!storage.contains("k").unwrap());
        storage.clear().unwrap();
    }

    #[test]
    fn contains_does_not_decrypt() {
        let storage = storage();
        storage
            .substrate()
            .set_string(&key_digest("k"), "not even base64!")
            .unwrap();
        assert!(storage.contains("k").unwrap());
    }

    /// Substrate whose storage medium is gone.
    struct BrokenSubstrate;

    fn io_fault() -> SubstrateError {
        SubstrateError::Io(std::io::Error::other("medium unavailable"))
    }

    impl Substrate for BrokenSubstrate {
        fn set_string(&self, _: &str, _: &str) -> Result<(), SubstrateError> {
            Err(io_fault())
        }
        fn get_string(&self, _: &str) -> Result<Option<String>, SubstrateError> {
            Err(io_fault())
        }
        fn contains(&self, _: &str) -> Result<bool, SubstrateError> {
            Err(io_fault())
        }
        fn remove(&self, _: &str) -> Result<(), SubstrateError> {
            Err(io_fault())
        }
        fn clear(&self) -> Result<(), SubstrateError> {
            Err(io_fault())
        }
        fn all_entries(&self) -> Result<BTreeMap<String, String>, SubstrateError> {
            Err(io_fault())
        }
    }

    /// Key provider whose key can no longer be used.
    struct RevokedKey;

    impl KeyProvider for RevokedKey {
        fn encrypt(&self, _: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Err(CryptoError::KeyUnavailable("storage".into()))
        }
        fn decrypt(&self, _: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
            Err(CryptoError::KeyUnavailable("storage".into()))
        }
    }

    #[test]
    fn enumeration_fault_is_not_skipped() {
        let storage = EncryptedStorage::new(
            SoftwareKeyProvider::ephemeral("storage").unwrap(),
            BrokenSubstrate,
        );

        let err = storage.get_all::<String>().unwrap_err();
        assert!(matches!(err, StorageError::Substrate(SubstrateError::Io(_))));

        let err = storage.get_all_with_report::<String>().unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Substrate);
    }

    #[test]
    fn substrate_faults_surface_from_every_operation() {
        let storage = EncryptedStorage::new(
            SoftwareKeyProvider::ephemeral("storage").unwrap(),
            BrokenSubstrate,
        );

        let err = storage.put("k", "v").unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Substrate);
        assert_eq!(
            storage.get::<String>("k").unwrap_err().kind(),
            StorageErrorKind::Substrate
        );
        assert!(storage.contains("k").is_err());
        assert!(storage.remove("k").is_err());
        assert!(storage.clear().is_err());
    }

    #[test]
    fn encrypt_fault_fails_put_and_writes_nothing() {
        let storage = EncryptedStorage::new(RevokedKey, MemorySubstrate::new());

        let err = storage.put("k", "v").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Crypto(CryptoError::KeyUnavailable(_))
        ));
        assert_eq!(err.kind(), StorageErrorKind::Undecodable);
        assert!(storage.substrate().is_empty());
    }

    #[test]
    fn unserializable_put_fails_and_writes_nothing() {
        use std::collections::HashMap;

        let storage = storage();
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON keys");
        let err = storage.put("k", &map).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Unserializable);
        assert!(storage.substrate().is_empty());
    }
}
