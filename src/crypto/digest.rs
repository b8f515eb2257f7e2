use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

/// Derive the substrate key for a logical key.
///
/// SHA-256 over the UTF-8 bytes, standard base64 with padding. The substrate
/// only ever sees this value, never the logical name.
pub fn key_digest(logical_key: &str) -> String {
    STANDARD.encode(Sha256::digest(logical_key.as_bytes()))
}
