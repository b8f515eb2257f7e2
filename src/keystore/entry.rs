use std::collections::BTreeMap;
use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::SignatureAlgorithm;

/// What a stored key can be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyKind {
    Symmetric,
    Signing { algorithm: SignatureAlgorithm },
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Symmetric => f.write_str("symmetric"),
            KeyKind::Signing { algorithm } => write!(f, "signing ({algorithm})"),
        }
    }
}

/// Public description of a stored key. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub alias: String,
    pub kind: KeyKind,
    pub created: String,
}

/// One key as held inside the sealed key table.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredKey {
    #[serde(flatten)]
    kind: KeyKind,
    #[serde(with = "material")]
    secret: Vec<u8>,
    created: String,
}

impl StoredKey {
    pub(crate) fn new(kind: KeyKind, secret: Zeroizing<Vec<u8>>) -> Self {
        Self {
            kind,
            secret: secret.to_vec(),
            created: Local::now().to_rfc3339(),
        }
    }

    pub(crate) fn kind(&self) -> KeyKind {
        self.kind
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub(crate) fn info(&self, alias: &str) -> KeyInfo {
        KeyInfo {
            alias: alias.to_owned(),
            kind: self.kind,
            created: self.created.clone(),
        }
    }
}

impl Drop for StoredKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Alias-ordered key table; the plaintext of the vault file.
#[derive(Serialize, Deserialize)]
pub(crate) struct KeyTable {
    pub(crate) keys: BTreeMap<String, StoredKey>,
    pub(crate) created: String,
}

impl KeyTable {
    pub(crate) fn new() -> Self {
        Self {
            keys: BTreeMap::new(),
            created: Local::now().to_rfc3339(),
        }
    }
}

/// Key material as base64 inside the sealed JSON.
mod material {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(secret: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(STANDARD.encode(secret));
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
