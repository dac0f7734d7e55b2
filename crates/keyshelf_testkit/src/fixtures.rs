//! Test fixtures and database helpers.
//!
//! Provides the shared test schema, unique database names and databases
//! that clean up after themselves.

use keyshelf_core::engine::{
    EngineConfig, Factory, FileSnapshotStore, IndexParameters, ObjectStoreParameters, SnapshotStore,
};
use keyshelf_core::{Database, DatabaseConfig};
use std::path::Path;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Store with in-line `id` keys and no indices.
pub const TEST_OBJECTS: &str = "TestObjects";

/// Store with in-line `id` keys and a `name` index.
pub const COMPLEX_TEST_OBJECTS: &str = "ComplexTestObjects";

/// Name of the index on [`COMPLEX_TEST_OBJECTS`].
pub const NAME_INDEX: &str = "name";

/// Returns the configuration of the test schema.
///
/// Version 1 creates [`TEST_OBJECTS`]; version 2 adds
/// [`COMPLEX_TEST_OBJECTS`] with its [`NAME_INDEX`].
pub fn test_config(name: impl Into<String>) -> DatabaseConfig {
    DatabaseConfig::new(name)
        .upgrade(1, |_, _, transaction| {
            transaction
                .create_object_store(TEST_OBJECTS, ObjectStoreParameters::new().key_path("id"))?;
            Ok(())
        })
        .and_then(|config| {
            config.upgrade(2, |_, _, transaction| {
                let store = transaction.create_object_store(
                    COMPLEX_TEST_OBJECTS,
                    ObjectStoreParameters::new().key_path("id"),
                )?;
                store.create_index(NAME_INDEX, "name", IndexParameters::new())?;
                Ok(())
            })
        })
        .expect("test schema versions are distinct")
}

/// Returns a database name no other test uses.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

/// Installs a fmt subscriber filtered by `RUST_LOG`, once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database manager.
    pub db: Database,
    factory: Factory,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates an in-memory database with the test schema.
    pub fn memory() -> Self {
        Self::with_config(Factory::in_memory(), test_config(unique_name("test")))
    }

    /// Creates an in-memory database with a custom configuration.
    pub fn with_config(factory: Factory, config: DatabaseConfig) -> Self {
        init_tracing();
        Self {
            db: Database::new(factory.clone(), config),
            factory,
            _temp_dir: None,
        }
    }

    /// Creates a database with the test schema persisted to a temporary
    /// directory.
    pub fn file() -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileSnapshotStore::open(temp_dir.path())
            .expect("Failed to open snapshot store")
            .sync_on_commit(false);
        let store: Arc<dyn SnapshotStore> = Arc::new(store);
        let factory = Factory::with_store(EngineConfig::default(), store);
        Self {
            db: Database::new(factory.clone(), test_config(unique_name("file"))),
            factory,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the factory the database was opened from.
    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Returns a second manager for the same database, with its own
    /// connection.
    pub fn second_manager(&self) -> Database {
        Database::new(self.factory.clone(), test_config(self.db.name()))
    }

    /// Returns the snapshot directory if file-based.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}
