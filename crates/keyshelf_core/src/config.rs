//! Database configuration.

use crate::error::CoreResult;
use crate::migration::{SchemaVersion, UpgradeRegistry};
use keyshelf_engine::{Connection, Transaction as NativeTransaction, TransactionMode, UpgradeEvent};

/// Access mode for transactions opened through a [`crate::Database`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    #[default]
    ReadWrite,
}

impl From<AccessMode> for TransactionMode {
    fn from(mode: AccessMode) -> Self {
        match mode {
            AccessMode::ReadOnly => TransactionMode::ReadOnly,
            AccessMode::ReadWrite => TransactionMode::ReadWrite,
        }
    }
}

/// Configuration for a [`crate::Database`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database name.
    pub name: String,

    /// Upgrade steps; the highest version is the schema version opened.
    pub upgrades: UpgradeRegistry,

    /// Mode used by `open_store`, `open_stores` and `open_all_stores`.
    pub default_mode: AccessMode,
}

impl DatabaseConfig {
    /// Creates a configuration for `name` with no upgrade steps.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upgrades: UpgradeRegistry::new(),
            default_mode: AccessMode::default(),
        }
    }

    /// Sets the database name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers the upgrade step for `version`.
    ///
    /// # Errors
    ///
    /// Fails for version 0 or a version registered twice.
    pub fn upgrade<F>(mut self, version: SchemaVersion, step: F) -> CoreResult<Self>
    where
        F: Fn(&UpgradeEvent, &Connection, &NativeTransaction) -> CoreResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.upgrades.register(version, step)?;
        Ok(self)
    }

    /// Sets the default access mode.
    #[must_use]
    pub fn default_mode(mut self, mode: AccessMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Returns the schema version opened.
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.upgrades.version()
    }
}
