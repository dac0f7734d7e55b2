//! Directory-based snapshot store for persistent databases.
//!
//! Layout:
//!
//! ```text
//! <dir>/
//! ├─ LOCK                 # Advisory lock, one factory per directory
//! ├─ <name>.snapshot      # Latest committed image of database <name>
//! └─ <name>.snapshot.tmp  # Written, then renamed over the snapshot
//! ```
//!
//! Database names are escaped so that any name maps to a single file name.

use super::SnapshotStore;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_EXT: &str = ".snapshot";
const TEMP_EXT: &str = ".snapshot.tmp";

/// A snapshot store backed by a directory.
///
/// The store holds an exclusive lock on `<dir>/LOCK` for as long as it
/// lives, so only one store (and one factory) can use a directory at a
/// time.
///
/// # Example
///
/// ```no_run
/// use keyshelf_engine::{FileSnapshotStore, SnapshotStore};
/// use std::path::Path;
///
/// let store = FileSnapshotStore::open(Path::new("data")).unwrap().sync_on_commit(false);
/// store.save("todo", b"image").unwrap();
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    sync_on_commit: bool,
    _lock_file: File,
}

impl FileSnapshotStore {
    /// Opens (creating if needed) a snapshot directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another store holds the lock, or
    /// an I/O error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            sync_on_commit: true,
            _lock_file: lock_file,
        })
    }

    /// Sets whether every save is synced to disk before it returns.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Returns the snapshot directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, name: &str) -> StorageResult<PathBuf> {
        Ok(self.dir.join(format!("{}{SNAPSHOT_EXT}", escape(name)?)))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path(name)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, name: &str, snapshot: &[u8]) -> StorageResult<()> {
        let path = self.snapshot_path(name)?;
        let temp = self.dir.join(format!("{}{TEMP_EXT}", escape(name)?));

        let mut file = File::create(&temp)?;
        file.write_all(snapshot)?;
        if self.sync_on_commit {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp, &path)?;
        if self.sync_on_commit {
            self.sync_directory()?;
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.snapshot_path(name)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(SNAPSHOT_EXT) {
                if let Some(name) = unescape(stem) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

// Keeps ASCII alphanumerics, '-' and '_'; every other byte becomes %XX.
fn escape(name: &str) -> StorageResult<String> {
    if name.is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    Ok(escaped)
}

fn unescape(escaped: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut input = escaped.bytes();
    while let Some(byte) = input.next() {
        if byte == b'%' {
            let hex = [input.next()?, input.next()?];
            let hex = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load() {
        let temp = tempdir().unwrap();
        let store = FileSnapshotStore::open(temp.path()).unwrap();
        assert_eq!(store.load("todo").unwrap(), None);
        store.save("todo", b"first").unwrap();
        store.save("todo", b"second").unwrap();
        assert_eq!(store.load("todo").unwrap(), Some(b"second".to_vec()));
        assert!(!temp.path().join("todo.snapshot.tmp").exists());
    }

    #[test]
    fn names_survive_escaping() {
        let temp = tempdir().unwrap();
        let store = FileSnapshotStore::open(temp.path()).unwrap().sync_on_commit(false);
        store.save("my app/db.v2", b"x").unwrap();
        store.save("plain", b"y").unwrap();
        assert_eq!(
            store.names().unwrap(),
            vec!["my app/db.v2".to_string(), "plain".to_string()]
        );
        store.remove("my app/db.v2").unwrap();
        store.remove("my app/db.v2").unwrap();
        assert_eq!(store.names().unwrap(), vec!["plain".to_string()]);
    }

    #[test]
    fn empty_name_is_rejected() {
        let temp = tempdir().unwrap();
        let store = FileSnapshotStore::open(temp.path()).unwrap();
        assert!(matches!(
            store.save("", b"x"),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _first = FileSnapshotStore::open(temp.path()).unwrap();
        assert!(matches!(
            FileSnapshotStore::open(temp.path()),
            Err(StorageError::Locked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _store = FileSnapshotStore::open(temp.path()).unwrap();
        }
        let _again = FileSnapshotStore::open(temp.path()).unwrap();
    }
}
