//! The entry point: opening and deleting databases.

use crate::backend::SnapshotStore;
use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::database::DatabaseCell;
use crate::error::{DomError, EngineResult, ErrorName};
use crate::request::{OpenRequest, Request, UpgradeEvent};
use crate::state::DatabaseState;
use crate::transaction::{self, Transaction, TransactionMode};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

struct FactoryInner {
    config: EngineConfig,
    store: Option<Arc<dyn SnapshotStore>>,
    databases: Mutex<HashMap<String, Arc<DatabaseCell>>>,
}

impl FactoryInner {
    /// Returns the cell for `name`, loading its snapshot on first use.
    fn cell(&self, name: &str) -> EngineResult<Arc<DatabaseCell>> {
        let mut databases = self.databases.lock();
        if let Some(cell) = databases.get(name) {
            return Ok(Arc::clone(cell));
        }
        let state = match &self.store {
            Some(store) => match store.load(name)? {
                Some(bytes) => DatabaseState::decode(&bytes).map_err(|err| {
                    DomError::unknown(format!("The snapshot of {name} is corrupt: {err}"))
                })?,
                None => DatabaseState::default(),
            },
            None => DatabaseState::default(),
        };
        let cell = Arc::new(DatabaseCell::new(
            name,
            self.config.clone(),
            state,
            self.store.clone(),
        ));
        databases.insert(name.to_string(), Arc::clone(&cell));
        Ok(cell)
    }
}

/// Opens, deletes and lists databases.
///
/// Every database lives in the factory's memory for as long as the factory
/// does. A factory built with a [`SnapshotStore`] also loads databases from
/// it and writes a snapshot after every committed read-write or upgrade
/// transaction.
///
/// Requests are served by tasks on the current tokio runtime.
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl Factory {
    /// Creates a purely in-memory factory with the default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Creates a purely in-memory factory.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a factory that persists databases in `store`.
    #[must_use]
    pub fn with_store(config: EngineConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: EngineConfig, store: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                config,
                store,
                databases: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Opens a connection to `name`.
    ///
    /// `None` opens the stored version, or version 1 for a new database.
    /// A version above the stored one fires upgrade-needed on the returned
    /// request with a version-change transaction; the open succeeds once
    /// that transaction commits. While other connections are open the
    /// upgrade waits for them to close and fires blocked. An upgrade does
    /// not start its transaction until an upgrade-needed handler is
    /// installed.
    ///
    /// Asynchronous failures: `VersionError` for a version below the
    /// stored one, `AbortError` when the upgrade transaction aborts.
    ///
    /// # Errors
    ///
    /// `TypeError` for version 0, `InvalidStateError` outside a tokio
    /// runtime.
    pub fn open(&self, name: &str, version: Option<u64>) -> EngineResult<OpenRequest> {
        if version == Some(0) {
            return Err(DomError::new(
                ErrorName::TypeError,
                "The version provided must not be 0.",
            ));
        }
        let runtime = current_runtime()?;
        let request = OpenRequest::new();
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let target = request.clone();
        runtime.spawn(async move {
            match open_connection(&inner, &name, version, &target).await {
                Ok(connection) => target.succeed(connection),
                Err(error) => {
                    debug!(database = %name, error = %error, "open failed");
                    target.fail(error);
                }
            }
        });
        Ok(request)
    }

    /// Deletes `name` and everything in it, once every connection to it has
    /// closed. Deleting a database that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` outside a tokio runtime.
    pub fn delete_database(&self, name: &str) -> EngineResult<Request<()>> {
        let runtime = current_runtime()?;
        let request = Request::new();
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let target = request.clone();
        runtime.spawn(async move {
            match delete(&inner, &name, &target).await {
                Ok(()) => target.succeed(()),
                Err(error) => {
                    warn!(database = %name, error = %error, "delete failed");
                    target.fail(error);
                }
            }
        });
        Ok(request)
    }

    /// Lists the databases that exist, sorted.
    ///
    /// # Errors
    ///
    /// `UnknownError` if the snapshot store cannot be listed.
    pub fn database_names(&self) -> EngineResult<Vec<String>> {
        let mut names: BTreeSet<String> = self
            .inner
            .databases
            .lock()
            .iter()
            .filter(|(_, cell)| cell.version() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        if let Some(store) = &self.inner.store {
            for name in store.names()? {
                let loaded = self.inner.databases.lock().get(&name).map(|cell| cell.version());
                if loaded.map_or(true, |version| version > 0) {
                    names.insert(name);
                }
            }
        }
        Ok(names.into_iter().collect())
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("config", &self.inner.config)
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}

fn current_runtime() -> EngineResult<Handle> {
    Handle::try_current().map_err(|_| DomError::invalid_state("No async runtime is available."))
}

async fn open_connection(
    inner: &FactoryInner,
    name: &str,
    version: Option<u64>,
    request: &OpenRequest,
) -> EngineResult<Connection> {
    let cell = inner.cell(name)?;
    let _queue = cell.queue.lock().await;

    let old_version = cell.version();
    let new_version = version.unwrap_or(old_version.max(1));
    if new_version < old_version {
        return Err(DomError::new(
            ErrorName::VersionError,
            format!(
                "The requested version ({new_version}) is less than the existing version ({old_version})."
            ),
        ));
    }
    if new_version == old_version {
        return Ok(Connection::open(Arc::clone(&cell)));
    }

    let others = cell.open_connections();
    if others > 0 {
        request.block(format!(
            "The database {name} is still open in {others} other connection(s)."
        ));
        cell.connections_closed().await;
    }

    let snapshot = {
        let mut state = cell.state.lock();
        let snapshot = state.clone();
        state.version = new_version;
        snapshot
    };
    let connection = Connection::open(Arc::clone(&cell));
    let transaction = match Transaction::begin(
        &connection,
        Vec::new(),
        TransactionMode::VersionChange,
        Some(snapshot),
    ) {
        Ok(transaction) => transaction,
        Err(error) => {
            cell.state.lock().version = old_version;
            connection.close();
            return Err(error);
        }
    };
    let outcome = transaction.outcome();

    debug!(database = name, old_version, new_version, "upgrade needed");
    request.upgrade_needed(UpgradeEvent {
        old_version,
        new_version,
        connection: connection.clone(),
        transaction,
    });

    match transaction::settled(outcome).await {
        Ok(()) => Ok(connection),
        Err(error) => {
            connection.close();
            Err(DomError::new(
                ErrorName::AbortError,
                format!("The upgrade transaction was aborted: {}", error.message),
            ))
        }
    }
}

async fn delete(inner: &FactoryInner, name: &str, request: &Request<()>) -> EngineResult<()> {
    let cell = inner.cell(name)?;
    let _queue = cell.queue.lock().await;

    let others = cell.open_connections();
    if others > 0 {
        request.block(format!(
            "The database {name} is still open in {others} other connection(s)."
        ));
        cell.connections_closed().await;
    }

    cell.reset()?;
    debug!(database = name, "database deleted");
    Ok(())
}
