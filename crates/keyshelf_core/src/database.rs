//! The database manager.
//!
//! A [`Database`] owns at most one connection to one named database. The
//! connection is opened lazily by the first operation that needs it,
//! running any pending upgrade steps, and is shared by every later
//! operation until [`Database::close`] or [`Database::delete`] tears it
//! down. The next operation after that opens a fresh one.

use crate::collection::Collection;
use crate::config::{AccessMode, DatabaseConfig};
use crate::deferred::Deferred;
use crate::error::{CoreError, CoreResult};
use crate::info::{DatabaseInfo, StoreInfo};
use crate::migration::SchemaVersion;
use crate::query::{QueryDirection, QUERY_DIRECTION};
use crate::transaction::manager::{self, PendingTransactions};
use crate::transaction::{Completion, TransactionOutcome};
use crate::translate::error_message_for;
use keyshelf_engine::{Connection, Factory};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Lifecycle state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the next operation opens one.
    Closed,
    /// An open is in flight.
    Opening,
    /// A connection is open.
    Open,
    /// The database is being deleted.
    Closing,
}

type OpenResult = Option<CoreResult<Connection>>;

enum Slot {
    Closed,
    Opening(watch::Receiver<OpenResult>),
    Open(Connection),
    Closing(watch::Receiver<bool>),
}

enum Wait {
    Open(watch::Receiver<OpenResult>),
    Close(watch::Receiver<bool>),
}

struct DatabaseInner {
    config: DatabaseConfig,
    factory: Factory,
    slot: Mutex<Slot>,
    pending: Arc<PendingTransactions>,
}

/// Transactional access to one database.
///
/// Cloning is cheap; clones share the connection and the set of pending
/// transactions.
///
/// ```no_run
/// use keyshelf_core::engine::{Factory, ObjectStoreParameters};
/// use keyshelf_core::{Database, DatabaseConfig};
/// use serde_json::json;
///
/// # async fn demo() -> keyshelf_core::CoreResult<()> {
/// let config = DatabaseConfig::new("notes").upgrade(1, |_, _, transaction| {
///     transaction.create_object_store("notes", ObjectStoreParameters::new().key_path("id"))?;
///     Ok(())
/// })?;
/// let database = Database::new(Factory::in_memory(), config);
///
/// database
///     .open_store("notes", |notes| async move {
///         notes.insert(json!({"id": 1, "text": "hello"})).await
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Creates a manager for the database `config` names. Nothing is opened
    /// until the first operation.
    #[must_use]
    pub fn new(factory: Factory, config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                factory,
                slot: Mutex::new(Slot::Closed),
                pending: Arc::new(PendingTransactions::default()),
            }),
        }
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Returns the schema version the manager opens.
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.inner.config.version()
    }

    /// Returns the state of the managed connection.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match &*self.inner.slot.lock() {
            Slot::Closed => ConnectionState::Closed,
            Slot::Opening(_) => ConnectionState::Opening,
            Slot::Open(_) => ConnectionState::Open,
            Slot::Closing(_) => ConnectionState::Closing,
        }
    }

    /// Returns the direction constants for queries.
    #[must_use]
    pub fn query_direction(&self) -> QueryDirection {
        QUERY_DIRECTION
    }

    /// Returns the number of transactions that have not settled yet.
    #[must_use]
    pub fn pending_transactions(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns the open connection, opening it first if needed.
    ///
    /// Concurrent callers share one in-flight open. A failed open leaves the
    /// manager closed; the next call tries again.
    ///
    /// # Errors
    ///
    /// Fails with a connection error if the open is rejected or blocked,
    /// or with the error of a failing upgrade step.
    pub async fn connection(&self) -> CoreResult<Connection> {
        loop {
            let wait = {
                let mut slot = self.inner.slot.lock();
                match &*slot {
                    Slot::Open(connection) if !connection.is_closed() => {
                        return Ok(connection.clone());
                    }
                    Slot::Opening(receiver) => Wait::Open(receiver.clone()),
                    Slot::Closing(receiver) => Wait::Close(receiver.clone()),
                    Slot::Closed | Slot::Open(_) => {
                        let receiver = start_open(&self.inner)?;
                        *slot = Slot::Opening(receiver.clone());
                        Wait::Open(receiver)
                    }
                }
            };
            match wait {
                Wait::Open(mut receiver) => {
                    let settled = receiver
                        .wait_for(Option::is_some)
                        .await
                        .map(|result| result.clone());
                    return match settled {
                        Ok(Some(result)) => result,
                        Ok(None) | Err(_) => Err(CoreError::Abandoned),
                    };
                }
                Wait::Close(mut receiver) => {
                    let _ = receiver.wait_for(|done| *done).await;
                }
            }
        }
    }

    /// Opens `name` in the default mode and passes it to `callback`.
    ///
    /// The callback's result is returned once the transaction commits. A
    /// failed transaction takes precedence over the callback's own error.
    ///
    /// The engine starts the transaction only after earlier transactions
    /// sharing the store have finished, when either side writes. A callback
    /// must not await a nested open of its own store in that case.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::StoreNotFound`] if the store does not exist,
    /// with the transaction's failure, or with the callback's error.
    pub async fn open_store<F, Fut, R>(&self, name: &str, callback: F) -> CoreResult<R>
    where
        F: FnOnce(Collection) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
    {
        self.open_store_with_mode(name, self.inner.config.default_mode, callback)
            .await
    }

    /// Same as [`Database::open_store`] with an explicit access mode.
    ///
    /// # Errors
    ///
    /// See [`Database::open_store`].
    pub async fn open_store_with_mode<F, Fut, R>(
        &self,
        name: &str,
        mode: AccessMode,
        callback: F,
    ) -> CoreResult<R>
    where
        F: FnOnce(Collection) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
    {
        self.open_stores_with_mode([name], mode, |collections| {
            let collection = collections
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::store_not_found([name]));
            async move { callback(collection?).await }
        })
        .await
    }

    /// Opens every store of `names` in one transaction and passes them to
    /// `callback` in request order.
    ///
    /// # Errors
    ///
    /// See [`Database::open_store`]. A missing store fails the call before
    /// any transaction is created, naming every requested store.
    pub async fn open_stores<I, S, F, Fut, R>(&self, names: I, callback: F) -> CoreResult<R>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<Collection>) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
    {
        self.open_stores_with_mode(names, self.inner.config.default_mode, callback)
            .await
    }

    /// Same as [`Database::open_stores`] with an explicit access mode.
    ///
    /// # Errors
    ///
    /// See [`Database::open_stores`].
    pub async fn open_stores_with_mode<I, S, F, Fut, R>(
        &self,
        names: I,
        mode: AccessMode,
        callback: F,
    ) -> CoreResult<R>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<Collection>) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let connection = self.connection().await?;
        let transaction = manager::begin(&connection, &names, mode, &self.inner.pending)?;
        let completion = transaction.completion().clone();
        let collections = transaction.into_collections()?;
        settle(completion, callback(collections).await).await
    }

    /// Opens every store of the database in one transaction.
    ///
    /// A database without stores passes an empty list and opens no
    /// transaction.
    ///
    /// # Errors
    ///
    /// See [`Database::open_store`].
    pub async fn open_all_stores<F, Fut, R>(&self, callback: F) -> CoreResult<R>
    where
        F: FnOnce(Vec<Collection>) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
    {
        self.open_all_stores_with_mode(self.inner.config.default_mode, callback)
            .await
    }

    /// Same as [`Database::open_all_stores`] with an explicit access mode.
    ///
    /// # Errors
    ///
    /// See [`Database::open_store`].
    pub async fn open_all_stores_with_mode<F, Fut, R>(
        &self,
        mode: AccessMode,
        callback: F,
    ) -> CoreResult<R>
    where
        F: FnOnce(Vec<Collection>) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
    {
        let connection = self.connection().await?;
        let names = connection.object_store_names();
        if names.is_empty() {
            return callback(Vec::new()).await;
        }
        let transaction = manager::begin(&connection, &names, mode, &self.inner.pending)?;
        let completion = transaction.completion().clone();
        let collections = transaction.into_collections()?;
        settle(completion, callback(collections).await).await
    }

    /// Closes the connection. Transactions already running finish first on
    /// the engine side. Closing a closed manager does nothing.
    pub async fn close(&self) {
        if let Some(connection) = self.detach(None).await {
            connection.close();
            debug!(database = self.name(), "connection closed");
        }
    }

    /// Closes the connection and deletes the database with everything in
    /// it. Operations started meanwhile wait for the deletion and then open
    /// a fresh database.
    ///
    /// # Errors
    ///
    /// Fails with a connection error if the engine rejects the deletion or
    /// other connections block it.
    pub async fn delete(&self) -> CoreResult<()> {
        let (done, closing) = watch::channel(false);
        if let Some(connection) = self.detach(Some(closing)).await {
            connection.close();
        }

        let done = Arc::new(done);
        let request = match self.inner.factory.delete_database(self.name()) {
            Ok(request) => request,
            Err(error) => {
                reopen(&self.inner, &done);
                return Err(CoreError::from(error).into_connection());
            }
        };
        // The slot must leave `Closing` even if this future is dropped, so
        // the handlers release it rather than the code after the await.
        let (deferred, promise) = Deferred::<()>::new();
        let on_blocked = deferred.clone();
        request.on_blocked(move |event| {
            on_blocked.reject(CoreError::request(error_message_for(&event)));
        });
        let on_error = deferred.clone();
        let inner = Arc::clone(&self.inner);
        let released = Arc::clone(&done);
        request.on_error(move |event| {
            reopen(&inner, &released);
            on_error.reject(CoreError::request(error_message_for(&event)));
        });
        let inner = Arc::clone(&self.inner);
        request.on_success(move |()| {
            reopen(&inner, &done);
            deferred.resolve(());
        });
        promise.await.map_err(CoreError::into_connection)?;
        debug!(database = self.name(), "database deleted");
        Ok(())
    }

    /// Waits for every transaction pending right now and returns how each
    /// settled, in the order they were opened. Returns immediately when
    /// nothing is pending.
    pub async fn flush(&self) -> Vec<TransactionOutcome> {
        debug!(
            database = self.name(),
            pending = self.inner.pending.len(),
            "flushing transactions"
        );
        self.inner.pending.settle_all().await
    }

    /// Describes the database and every store, read in a read-only
    /// transaction.
    ///
    /// # Errors
    ///
    /// Fails if the connection cannot be opened or the transaction fails.
    pub async fn database_info(&self) -> CoreResult<DatabaseInfo> {
        let connection = self.connection().await?;
        let names = connection.object_store_names();
        let mut object_stores = Vec::with_capacity(names.len());
        if !names.is_empty() {
            let transaction =
                manager::begin(&connection, &names, AccessMode::ReadOnly, &self.inner.pending)?;
            let completion = transaction.completion().clone();
            for collection in transaction.into_collections()? {
                object_stores.push(StoreInfo {
                    name: collection.name().to_string(),
                    key_path: collection.key_path(),
                    auto_increment: collection.auto_increment(),
                    indices: collection.index_names(),
                });
            }
            completion.wait().await.into_result()?;
        }
        Ok(DatabaseInfo {
            name: connection.name().to_string(),
            version: connection.version(),
            object_stores,
        })
    }

    /// Takes the connection out of the slot, waiting for an in-flight open
    /// first. Leaves the slot closed, or closing when `closing` is given.
    async fn detach(&self, closing: Option<watch::Receiver<bool>>) -> Option<Connection> {
        loop {
            let wait = {
                let mut slot = self.inner.slot.lock();
                match &*slot {
                    Slot::Opening(receiver) => Wait::Open(receiver.clone()),
                    Slot::Closing(receiver) => Wait::Close(receiver.clone()),
                    Slot::Closed | Slot::Open(_) => {
                        let next = closing.clone().map_or(Slot::Closed, Slot::Closing);
                        return match std::mem::replace(&mut *slot, next) {
                            Slot::Open(connection) => Some(connection),
                            _ => None,
                        };
                    }
                }
            };
            match wait {
                Wait::Open(mut receiver) => {
                    let _ = receiver.wait_for(Option::is_some).await;
                }
                Wait::Close(mut receiver) => {
                    let _ = receiver.wait_for(|done| *done).await;
                }
            }
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("state", &self.state())
            .field("pending", &self.pending_transactions())
            .finish()
    }
}

/// Waits for the transaction and combines its outcome with the callback's
/// result.
async fn settle<R>(completion: Completion, result: CoreResult<R>) -> CoreResult<R> {
    match completion.wait().await {
        TransactionOutcome::Completed => result,
        TransactionOutcome::Failed(error) => Err(error),
    }
}

/// Spawns the open of `inner`'s database. The slot moves to open or closed
/// before the result is published.
fn start_open(inner: &Arc<DatabaseInner>) -> CoreResult<watch::Receiver<OpenResult>> {
    let runtime = Handle::try_current()
        .map_err(|_| CoreError::connection("No async runtime is available."))?;
    let (sender, receiver) = watch::channel(None);
    let driver = Arc::clone(inner);
    runtime.spawn(async move {
        let result = open_native(&driver).await;
        *driver.slot.lock() = match &result {
            Ok(connection) => Slot::Open(connection.clone()),
            Err(_) => Slot::Closed,
        };
        sender.send_replace(Some(result));
    });
    Ok(receiver)
}

async fn open_native(inner: &DatabaseInner) -> CoreResult<Connection> {
    let name = inner.config.name.as_str();
    let version = inner.config.version();
    let request = inner
        .factory
        .open(name, Some(version))
        .map_err(|error| CoreError::from(error).into_connection())?;

    let step_error: Arc<Mutex<Option<CoreError>>> = Arc::new(Mutex::new(None));
    let failed = Arc::clone(&step_error);
    let upgrades = inner.config.upgrades.clone();
    request.on_upgrade_needed(move |event| {
        if let Err(error) = upgrades.apply(&event) {
            *failed.lock() = Some(error);
            if let Err(error) = event.transaction.abort() {
                trace!(error = %error, "upgrade transaction already finishing");
            }
        }
    });

    let (deferred, promise) = Deferred::<Connection>::new();
    deferred.resolve_with(&*request);
    match promise.await {
        Ok(connection) => {
            debug!(database = name, version = connection.version(), "database opened");
            Ok(connection)
        }
        Err(error) => Err(step_error
            .lock()
            .take()
            .unwrap_or_else(|| error.into_connection())),
    }
}

/// Ends a deletion: the slot closes and waiting operations proceed.
fn reopen(inner: &DatabaseInner, done: &watch::Sender<bool>) {
    {
        let mut slot = inner.slot.lock();
        if matches!(&*slot, Slot::Closing(_)) {
            *slot = Slot::Closed;
        }
    }
    done.send_replace(true);
}
