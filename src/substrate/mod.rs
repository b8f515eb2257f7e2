//! Persistent string key-value stores that [`EncryptedStorage`](crate::EncryptedStorage)
//! writes into.
//!
//! A substrate is responsible for serializing concurrent writes to the same
//! key; the storage layer adds no locking of its own.

mod file;
mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use file::FileSubstrate;
pub use memory::MemorySubstrate;

use crate::error::SubstrateError;

pub trait Substrate: Send + Sync {
    fn set_string(&self, key: &str, value: &str) -> Result<(), SubstrateError>;

    fn get_string(&self, key: &str) -> Result<Option<String>, SubstrateError>;

    fn contains(&self, key: &str) -> Result<bool, SubstrateError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), SubstrateError>;

    fn clear(&self) -> Result<(), SubstrateError>;

    fn all_entries(&self) -> Result<BTreeMap<String, String>, SubstrateError>;
}

impl<B: Substrate + ?Sized> Substrate for Box<B> {
    fn set_string(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        (**self).set_string(key, value)
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        (**self).get_string(key)
    }

    fn contains(&self, key: &str) -> Result<bool, SubstrateError> {
        (**self).contains(key)
    }

    fn remove(&self, key: &str) -> Result<(), SubstrateError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), SubstrateError> {
        (**self).clear()
    }

    fn all_entries(&self) -> Result<BTreeMap<String, String>, SubstrateError> {
        (**self).all_entries()
    }
}

impl<B: Substrate + ?Sized> Substrate for Arc<B> {
    fn set_string(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        (**self).set_string(key, value)
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        (**self).get_string(key)
    }

    fn contains(&self, key: &str) -> Result<bool, SubstrateError> {
        (**self).contains(key)
    }

    fn remove(&self, key: &str) -> Result<(), SubstrateError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), SubstrateError> {
        (**self).clear()
    }

    fn all_entries(&self) -> Result<BTreeMap<String, String>, SubstrateError> {
        (**self).all_entries()
    }
}
