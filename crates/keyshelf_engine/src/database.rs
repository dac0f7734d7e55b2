//! Per-name database cells shared by every connection to that database.

use crate::backend::SnapshotStore;
use crate::config::EngineConfig;
use crate::error::StorageResult;
use crate::state::DatabaseState;
use crate::transaction::Scheduler;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything the engine knows about one named database.
pub(crate) struct DatabaseCell {
    name: String,
    config: EngineConfig,
    pub(crate) state: Mutex<DatabaseState>,
    /// What the snapshot store holds: the state as of the last commit.
    committed: Mutex<DatabaseState>,
    pub(crate) scheduler: Scheduler,
    /// Number of open connections. Opens and deletes that need exclusive
    /// access wait for it to reach zero.
    connections: watch::Sender<usize>,
    /// Serializes open and delete requests for this name.
    pub(crate) queue: tokio::sync::Mutex<()>,
    persist_lock: Mutex<()>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl DatabaseCell {
    pub(crate) fn new(
        name: &str,
        config: EngineConfig,
        state: DatabaseState,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let (connections, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            config,
            committed: Mutex::new(if store.is_some() {
                state.clone()
            } else {
                DatabaseState::default()
            }),
            state: Mutex::new(state),
            scheduler: Scheduler::new(),
            connections,
            queue: tokio::sync::Mutex::new(()),
            persist_lock: Mutex::new(()),
            store,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub(crate) fn open_connections(&self) -> usize {
        *self.connections.borrow()
    }

    pub(crate) fn connection_opened(&self) {
        self.connections.send_modify(|count| *count += 1);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Waits until every connection has closed.
    pub(crate) async fn connections_closed(&self) {
        let mut count = self.connections.subscribe();
        let _ = count.wait_for(|open| *open == 0).await;
    }

    /// Publishes a committed transaction to the snapshot store.
    ///
    /// Only the stores in `scope` are copied from the live state, since
    /// other stores may hold writes of transactions still running. `None`
    /// copies everything, for version-change transactions.
    pub(crate) fn commit(&self, scope: Option<&[String]>) -> StorageResult<()> {
        if self.store.is_none() {
            return Ok(());
        }
        let _guard = self.persist_lock.lock();
        let mut committed = self.committed.lock();
        let previous = committed.clone();
        {
            let state = self.state.lock();
            match scope {
                None => *committed = state.clone(),
                Some(names) => {
                    for name in names {
                        match state.stores.get(name) {
                            Some(store) => {
                                committed.stores.insert(name.clone(), store.clone());
                            }
                            None => {
                                committed.stores.remove(name);
                            }
                        }
                    }
                }
            }
        }
        if let Err(err) = self.save(&committed) {
            *committed = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Forgets everything, in memory and in the snapshot store.
    pub(crate) fn reset(&self) -> StorageResult<()> {
        *self.state.lock() = DatabaseState::default();
        if self.store.is_none() {
            return Ok(());
        }
        let _guard = self.persist_lock.lock();
        let mut committed = self.committed.lock();
        *committed = DatabaseState::default();
        self.save(&committed)
    }

    /// A database at version 0 does not exist, so its snapshot is removed.
    fn save(&self, state: &DatabaseState) -> StorageResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if state.version == 0 {
            store.remove(&self.name)
        } else {
            store.save(&self.name, &state.encode()?)
        }
    }
}
