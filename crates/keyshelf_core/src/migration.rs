//! Schema upgrades.
//!
//! Upgrades are imperative steps keyed by schema version. Opening a database
//! at a higher version than the stored one runs every step above the stored
//! version, in ascending order, inside the engine's single version-change
//! transaction. If any step fails the whole upgrade rolls back.
//!
//! ```
//! use keyshelf_core::UpgradeRegistry;
//! use keyshelf_core::engine::ObjectStoreParameters;
//!
//! let mut upgrades = UpgradeRegistry::new();
//! upgrades
//!     .register(1, |_event, _connection, transaction| {
//!         transaction.create_object_store("notes", ObjectStoreParameters::new().key_path("id"))?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(upgrades.version(), 1);
//! ```

use crate::error::{CoreError, CoreResult};
use keyshelf_engine::{Connection, Transaction as NativeTransaction, UpgradeEvent};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Schema version number.
pub type SchemaVersion = u64;

/// One upgrade step.
///
/// Receives the upgrade event, the connection being opened and the
/// version-change transaction schema changes must run in.
pub type UpgradeStep =
    Arc<dyn Fn(&UpgradeEvent, &Connection, &NativeTransaction) -> CoreResult<()> + Send + Sync>;

/// Upgrade steps ordered by version.
#[derive(Clone, Default)]
pub struct UpgradeRegistry {
    steps: BTreeMap<SchemaVersion, UpgradeStep>,
}

impl UpgradeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the step that upgrades the schema to `version`.
    ///
    /// # Errors
    ///
    /// Returns a migration error for version 0 or a version that already
    /// has a step.
    pub fn register<F>(&mut self, version: SchemaVersion, step: F) -> CoreResult<()>
    where
        F: Fn(&UpgradeEvent, &Connection, &NativeTransaction) -> CoreResult<()>
            + Send
            + Sync
            + 'static,
    {
        if version == 0 {
            return Err(CoreError::migration("upgrade versions start at 1"));
        }
        if self.steps.contains_key(&version) {
            return Err(CoreError::migration(format!(
                "an upgrade for version {version} is already registered"
            )));
        }
        self.steps.insert(version, Arc::new(step));
        Ok(())
    }

    /// Returns the schema version the registered steps lead to, 1 when
    /// there are none.
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.steps.keys().next_back().copied().unwrap_or(1)
    }

    /// Returns the number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the versions of the steps an upgrade from `old_version`
    /// runs, ascending.
    #[must_use]
    pub fn pending(&self, old_version: SchemaVersion) -> Vec<SchemaVersion> {
        self.steps
            .range(old_version.saturating_add(1)..)
            .map(|(version, _)| *version)
            .collect()
    }

    /// Runs every step above `event.old_version`, ascending.
    ///
    /// Stops at the first failing step and returns its error; the caller is
    /// expected to abort the upgrade transaction.
    pub(crate) fn apply(&self, event: &UpgradeEvent) -> CoreResult<Vec<SchemaVersion>> {
        let mut applied = Vec::new();
        for (version, step) in self.steps.range(event.old_version.saturating_add(1)..) {
            debug!(
                database = event.connection.name(),
                version = *version,
                old_version = event.old_version,
                "running upgrade"
            );
            if let Err(error) = step(event, &event.connection, &event.transaction) {
                warn!(
                    database = event.connection.name(),
                    version = *version,
                    error = %error,
                    "upgrade failed"
                );
                return Err(error);
            }
            applied.push(*version);
        }
        Ok(applied)
    }
}

impl fmt::Debug for UpgradeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeRegistry")
            .field("versions", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &UpgradeEvent, _: &Connection, _: &NativeTransaction) -> CoreResult<()> {
        Ok(())
    }

    #[test]
    fn empty_registry_targets_version_one() {
        let registry = UpgradeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.version(), 1);
        assert!(registry.pending(0).is_empty());
    }

    #[test]
    fn version_is_highest_registered() {
        let mut registry = UpgradeRegistry::new();
        registry.register(3, noop).unwrap();
        registry.register(1, noop).unwrap();
        assert_eq!(registry.version(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_and_zero_versions_are_rejected() {
        let mut registry = UpgradeRegistry::new();
        registry.register(1, noop).unwrap();
        assert!(matches!(
            registry.register(1, noop),
            Err(CoreError::Migration { .. })
        ));
        assert!(matches!(
            registry.register(0, noop),
            Err(CoreError::Migration { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn pending_skips_applied_versions() {
        let mut registry = UpgradeRegistry::new();
        for version in [1, 2, 4] {
            registry.register(version, noop).unwrap();
        }
        assert_eq!(registry.pending(0), vec![1, 2, 4]);
        assert_eq!(registry.pending(2), vec![4]);
        assert!(registry.pending(4).is_empty());
    }
}
