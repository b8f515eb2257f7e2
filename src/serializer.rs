//! Typed value <-> byte conversion used by [`EncryptedStorage`](crate::EncryptedStorage).

use serde::{Serialize, de::DeserializeOwned};

use crate::error::SerializationError;

/// Converts typed values to opaque bytes and back.
///
/// Implementations must satisfy `from_bytes(to_bytes(v)) == v` and have no
/// side effects.
pub trait Serializer: Send + Sync {
    fn to_bytes<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    fn from_bytes<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError>;
}

/// JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn to_bytes<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(|e| SerializationError::Encode(Box::new(e)))
    }

    fn from_bytes<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(data).map_err(|e| SerializationError::Decode(Box::new(e)))
    }
}
