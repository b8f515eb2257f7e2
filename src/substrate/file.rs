use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use super::Substrate;
use crate::atomic::AtomicFile;
use crate::error::SubstrateError;

/// Substrate persisted as a single JSON object file.
///
/// The whole map is cached in memory and every mutation rewrites the file
/// atomically while holding the lock, so writers are serialized and the file
/// always reflects a complete state.
#[derive(Debug)]
pub struct FileSubstrate {
    file: AtomicFile,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileSubstrate {
    /// Opens the substrate at `path`. A missing file is an empty substrate;
    /// it is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SubstrateError> {
        let file = AtomicFile::new(path.as_ref());
        let entries = match file.load_if_exists()? {
            Some(data) if !data.is_empty() => serde_json::from_slice(&data)?,
            _ => BTreeMap::new(),
        };
        debug!(path = %file.path().display(), entries = entries.len(), "opened file substrate");

        Ok(Self {
            file,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Applies `change` to a copy of the map and persists it; the in-memory
    /// view only moves forward once the file write succeeded.
    fn mutate<F>(&self, change: F) -> Result<(), SubstrateError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(&next)?;
        self.file.save(&data)?;
        *entries = next;
        Ok(())
    }
}

impl Substrate for FileSubstrate {
    fn set_string(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        self.mutate(|map| {
            map.insert(key.to_owned(), value.to_owned());
            true
        })
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool, SubstrateError> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn remove(&self, key: &str) -> Result<(), SubstrateError> {
        self.mutate(|map| map.remove(key).is_some())
    }

    fn clear(&self) -> Result<(), SubstrateError> {
        self.mutate(|map| {
            let changed = !map.is_empty();
            map.clear();
            changed
        })
    }

    fn all_entries(&self) -> Result<BTreeMap<String, String>, SubstrateError> {
        Ok(self.entries.lock().clone())
    }
}
