use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::Substrate;
use crate::error::SubstrateError;

/// Process-local substrate. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Substrate for MemorySubstrate {
    fn set_string(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool, SubstrateError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn remove(&self, key: &str) -> Result<(), SubstrateError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), SubstrateError> {
        self.entries.write().clear();
        Ok(())
    }

    fn all_entries(&self) -> Result<BTreeMap<String, String>, SubstrateError> {
        Ok(self.entries.read().clone())
    }
}
