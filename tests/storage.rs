use std::sync::Arc;
use std::thread;

use base64::{Engine, engine::general_purpose::STANDARD};
use keyhold::error::BoxError;
use keyhold::{
    AtomicFile, EncryptedStorage, FileSubstrate, GatedSigner, KdfParams, KeyEntry, KeyError,
    KeyStore, MemorySubstrate, SignatureAlgorithm, Signer, SoftwareKeyProvider, StorageError,
    StorageErrorKind, Substrate, key_digest,
};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    expires: u64,
    scopes: Vec<String>,
}

fn session() -> Session {
    Session {
        user: "ada".into(),
        expires: 1_700_000_000,
        scopes: vec!["read".into(), "write".into()],
    }
}

fn storage() -> EncryptedStorage<SoftwareKeyProvider, MemorySubstrate> {
    EncryptedStorage::new(
        SoftwareKeyProvider::ephemeral("storage").unwrap(),
        MemorySubstrate::new(),
    )
}

#[test]
fn structured_values_roundtrip() {
    let storage = storage();
    storage.put("session", &session()).unwrap();
    storage.put("count", &7u32).unwrap();
    storage.put("flags", &vec![true, false]).unwrap();

    assert_eq!(storage.get::<Session>("session").unwrap(), session());
    assert_eq!(storage.get::<u32>("count").unwrap(), 7);
    assert_eq!(storage.get::<Vec<bool>>("flags").unwrap(), vec![true, false]);
}

#[test]
fn digests_are_deterministic_and_distinct() {
    assert_eq!(key_digest("user.token"), key_digest("user.token"));
    assert_ne!(key_digest("user.token"), key_digest("user.tokem"));
    assert_ne!(key_digest("a"), key_digest("A"));
}

#[test]
fn tampered_record_fails_with_crypto_error() {
    let storage = storage();
    storage.put("session", &session()).unwrap();

    let digest = key_digest("session");
    let encoded = storage.substrate().get_string(&digest).unwrap().unwrap();
    let raw = STANDARD.decode(&encoded).unwrap();

    for bit in [0, 8 * 24 + 3, raw.len() * 8 - 1] {
        let mut tampered = raw.clone();
        tampered[bit / 8] ^= 1 << (bit % 8);
        storage
            .substrate()
            .set_string(&digest, &STANDARD.encode(&tampered))
            .unwrap();

        let err = storage.get::<Session>("session").unwrap_err();
        assert!(matches!(err, StorageError::Crypto(_)), "bit {bit}: {err:?}");
    }

    // untouched ciphertext still decrypts
    storage.substrate().set_string(&digest, &encoded).unwrap();
    assert_eq!(storage.get::<Session>("session").unwrap(), session());
}

#[test]
fn verify_distinguishes_other_data() {
    let mut keys = KeyStore::ephemeral();
    for (alias, algorithm) in [
        ("ec", SignatureAlgorithm::EcdsaSecp256k1Sha256),
        ("ed", SignatureAlgorithm::Ed25519),
    ] {
        keys.generate_key_pair(alias, algorithm).unwrap();
        let signer = keys.signer(alias).unwrap();

        let signature = signer.sign(b"data").unwrap();
        let other = signer.sign(b"other data").unwrap();

        assert!(signer.verify(b"data", &signature).unwrap());
        assert!(!signer.verify(b"data", &other).unwrap());
        assert!(!signer.verify(b"data", b"garbage").unwrap());
    }
}

#[test]
fn enumeration_skips_records_under_foreign_key() {
    let substrate = Arc::new(MemorySubstrate::new());
    let ours = EncryptedStorage::new(
        SoftwareKeyProvider::ephemeral("ours").unwrap(),
        Arc::clone(&substrate),
    );
    let theirs = EncryptedStorage::new(
        SoftwareKeyProvider::ephemeral("theirs").unwrap(),
        Arc::clone(&substrate),
    );

    ours.put("mine", &session()).unwrap();
    theirs.put("foreign", &session()).unwrap();

    assert_eq!(ours.get_all::<Session>().unwrap(), vec![session()]);

    let report = ours.get_all_with_report::<Session>().unwrap();
    assert_eq!(report.values, vec![session()]);
    assert_eq!(report.skipped, 1);
}

#[test]
fn remove_is_idempotent() {
    let storage = storage();
    storage.remove("absent").unwrap();
    assert!(!storage.contains("absent").unwrap());

    storage.put("present", "x").unwrap();
    storage.remove("present").unwrap();
    storage.remove("present").unwrap();
    assert!(!storage.contains("present").unwrap());
}

#[test]
fn user_token_scenario() {
    let storage = storage();
    storage.put("user.token", "abc123").unwrap();

    let entries = storage.substrate().all_entries().unwrap();
    let keys: Vec<_> = entries.keys().cloned().collect();
    assert_eq!(keys, vec!["134nSH0WfyW4dOvkwygWPJ1YeAGXq/01vGyPgKgbb0g=".to_string()]);

    assert_eq!(storage.get::<String>("user.token").unwrap(), "abc123");
    storage.clear().unwrap();
    assert!(!storage.contains("user.token").unwrap());
    assert_eq!(
        storage.get::<String>("user.token").unwrap_err().kind(),
        StorageErrorKind::NotFound
    );
}

#[test]
fn vault_backed_storage_survives_reopen() {
    let dir = tempdir().unwrap();
    let vault = dir.path().join("vault.khld");
    let data = dir.path().join("data.json");
    let kdf = KdfParams::new(1024, 1, 1).unwrap();

    let mut keys = KeyStore::init(
        Zeroizing::new("pw".into()),
        AtomicFile::new(&vault),
        kdf,
    )
    .unwrap();
    keys.generate_symmetric_key("storage").unwrap();
    keys.generate_key_pair("device", SignatureAlgorithm::Ed25519)
        .unwrap();
    keys.save().unwrap();

    let public_key = keys.signer("device").unwrap().public_key().unwrap();
    let storage = EncryptedStorage::new(
        keys.key_provider("storage").unwrap(),
        FileSubstrate::open(&data).unwrap(),
    );
    storage.put("session", &session()).unwrap();
    drop(storage);
    drop(keys);

    let keys = KeyStore::open(Zeroizing::new("pw".into()), AtomicFile::new(&vault)).unwrap();
    let storage = EncryptedStorage::new(
        keys.key_provider("storage").unwrap(),
        FileSubstrate::open(&data).unwrap(),
    );
    assert_eq!(storage.get::<Session>("session").unwrap(), session());
    assert_eq!(
        keys.signer("device").unwrap().public_key().unwrap(),
        public_key
    );

    assert!(KeyStore::open(Zeroizing::new("nope".into()), AtomicFile::new(&vault)).is_err());
}

#[test]
fn storage_is_shareable_across_threads() {
    let storage = Arc::new(storage());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                let key = format!("k{i}");
                storage.put(&key, &i).unwrap();
                assert_eq!(storage.get::<i32>(&key).unwrap(), i);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut all = storage.get_all::<i32>().unwrap();
    all.sort();
    assert_eq!(all, (0..8).collect::<Vec<_>>());
}

#[test]
fn gated_signer_requires_approval() {
    let mut keys = KeyStore::ephemeral();
    keys.generate_key_pair("device", SignatureAlgorithm::Ed25519)
        .unwrap();

    let allowed = keys.signer("device").unwrap();
    let signature = allowed.sign(b"data").unwrap();

    let denied = GatedSigner::new(
        keys.signer("device").unwrap(),
        |_: &KeyEntry| -> Result<(), BoxError> { Err("user declined".into()) },
    );

    let err = denied.sign(b"data").unwrap_err();
    assert!(matches!(err, KeyError::Operation { ref alias, .. } if alias == "device"));

    // public operations stay available
    assert!(denied.verify(b"data", &signature).unwrap());
    assert_eq!(denied.public_key().unwrap(), allowed.public_key().unwrap());
}
