//! Snapshot stores: where committed database images are kept.

mod file;
mod memory;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

use crate::error::StorageResult;

/// Persists one encoded snapshot per database name.
///
/// Stores are opaque byte stores; the engine owns the snapshot format.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `save`
/// - `save` replaces the previous snapshot atomically
/// - `remove` of a missing name is not an error
pub trait SnapshotStore: Send + Sync {
    /// Loads the snapshot for `name`, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    fn load(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Saves (replaces) the snapshot for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, name: &str, snapshot: &[u8]) -> StorageResult<()>;

    /// Removes the snapshot for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be removed.
    fn remove(&self, name: &str) -> StorageResult<()>;

    /// Lists the names that have a snapshot, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn names(&self) -> StorageResult<Vec<String>>;
}
