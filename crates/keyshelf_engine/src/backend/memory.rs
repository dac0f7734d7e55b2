//! In-memory snapshot store for testing.

use super::SnapshotStore;
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A snapshot store that keeps snapshots in memory.
///
/// Useful for tests that need to observe what the engine persisted, or to
/// hand the same snapshots to a second factory.
///
/// # Example
///
/// ```rust
/// use keyshelf_engine::{MemorySnapshotStore, SnapshotStore};
///
/// let store = MemorySnapshotStore::new();
/// store.save("todo", b"image").unwrap();
/// assert_eq!(store.load("todo").unwrap(), Some(b"image".to_vec()));
/// assert_eq!(store.names().unwrap(), vec!["todo".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of saved snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Returns true if nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.snapshots.read().get(name).cloned())
    }

    fn save(&self, name: &str, snapshot: &[u8]) -> StorageResult<()> {
        self.snapshots
            .write()
            .insert(name.to_string(), snapshot.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.snapshots.write().remove(name);
        Ok(())
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        Ok(self.snapshots.read().keys().cloned().collect())
    }
}
