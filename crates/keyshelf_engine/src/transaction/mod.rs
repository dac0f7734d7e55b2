//! Native transactions.
//!
//! A [`Transaction`] is a keep-alive handle: it, every [`ObjectStore`] and
//! [`crate::Index`] taken from it, and every live [`crate::Cursor`] keep the
//! transaction open. Requests run in issuance order on a worker task; once
//! the last handle is dropped and the queue has drained the transaction
//! commits. The first failing request aborts it, rolling back its writes.
//!
//! A transaction runs nothing until every earlier transaction it conflicts
//! with has finished (see [`Scheduler`]), so its writes are never seen or
//! undone by another transaction over the same stores.

mod operation;
mod scheduler;
mod worker;

pub(crate) use operation::Context;
pub(crate) use scheduler::Scheduler;

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::database::DatabaseCell;
use crate::error::{DomError, EngineResult};
use crate::event::{ErrorEvent, EventSlot};
use crate::request::Request;
use crate::state::{DatabaseState, StoreState};
use crate::store::ObjectStore;
use keyshelf_codec::KeyPath;
use operation::{Job, Operation, UndoLog};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::trace;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes records.
    ReadWrite,
    /// Runs during an open that raises the version; may change the schema.
    VersionChange,
}

/// Options for [`Transaction::create_object_store`].
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreParameters {
    /// Where records carry their key. `None` means keys are passed
    /// alongside records (out-of-line).
    pub key_path: Option<KeyPath>,
    /// Whether the store generates keys for records that have none.
    pub auto_increment: bool,
}

impl ObjectStoreParameters {
    /// Creates parameters for an out-of-line store without a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key path.
    #[must_use]
    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Sets whether keys are generated.
    #[must_use]
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Active,
    Aborting,
    Finished,
}

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Committed,
    Aborted(DomError),
}

pub(crate) enum Message {
    Run(Box<dyn Operation>),
    Abort,
}

pub(crate) struct TxnShared {
    id: u64,
    mode: TransactionMode,
    scope: Vec<String>,
    connection: Connection,
    phase: Mutex<Phase>,
    error_value: Mutex<Option<DomError>>,
    complete: EventSlot<()>,
    error: EventSlot<ErrorEvent>,
    abort: EventSlot<ErrorEvent>,
    outcome: watch::Sender<Option<Outcome>>,
}

impl TxnShared {
    fn cell(&self) -> &DatabaseCell {
        self.connection.cell()
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    /// Stores the transaction may write, or `None` for every store.
    fn written_scope(&self) -> Option<&[String]> {
        match self.mode {
            TransactionMode::VersionChange => None,
            _ => Some(self.scope.as_slice()),
        }
    }

    fn finish(&self, outcome: Outcome) {
        self.set_phase(Phase::Finished);
        if let Outcome::Aborted(error) = &outcome {
            *self.error_value.lock() = Some(error.clone());
        }
        self.cell().scheduler.finish(self.id);
        self.outcome.send_replace(Some(outcome));
    }
}

struct TxnHandle {
    sender: mpsc::UnboundedSender<Message>,
    shared: Arc<TxnShared>,
}

/// A native transaction over a fixed set of object stores.
#[derive(Clone)]
pub struct Transaction {
    handle: Arc<TxnHandle>,
}

impl Transaction {
    pub(crate) fn begin(
        connection: &Connection,
        scope: Vec<String>,
        mode: TransactionMode,
        snapshot: Option<DatabaseState>,
    ) -> EngineResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| DomError::invalid_state("No async runtime is available."))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let (outcome, _) = watch::channel(None);
        let shared = Arc::new(TxnShared {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            mode,
            scope,
            connection: connection.clone(),
            phase: Mutex::new(Phase::Active),
            error_value: Mutex::new(None),
            complete: EventSlot::default(),
            error: EventSlot::default(),
            abort: EventSlot::default(),
            outcome,
        });
        trace!(
            transaction = shared.id,
            database = connection.name(),
            mode = ?mode,
            scope = ?shared.scope,
            "transaction started"
        );
        connection
            .cell()
            .scheduler
            .register(shared.id, &shared.scope, mode);
        runtime.spawn(worker::run(
            Arc::clone(&shared),
            receiver,
            UndoLog::new(snapshot),
        ));
        Ok(Self {
            handle: Arc::new(TxnHandle { sender, shared }),
        })
    }

    fn shared(&self) -> &TxnShared {
        &self.handle.shared
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.shared().mode
    }

    /// Returns the connection the transaction runs on.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.shared().connection
    }

    /// Names of the stores in scope, sorted.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        match self.mode() {
            TransactionMode::VersionChange => {
                self.read(|state| state.stores.keys().cloned().collect())
            }
            _ => self.shared().scope.clone(),
        }
    }

    /// Returns the error the transaction aborted with, if it did.
    #[must_use]
    pub fn error(&self) -> Option<DomError> {
        self.shared().error_value.lock().clone()
    }

    /// Returns a handle to a store in scope.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` once the transaction has finished, and
    /// `NotFoundError` for a store that is out of scope or does not exist.
    pub fn object_store(&self, name: &str) -> EngineResult<ObjectStore> {
        if self.is_finished() {
            return Err(DomError::invalid_state("The transaction has finished."));
        }
        let in_scope = self.mode() == TransactionMode::VersionChange
            || self.shared().scope.iter().any(|s| s == name);
        if !in_scope || self.read(|state| state.store(name).is_err()) {
            return Err(DomError::not_found(format!(
                "No objectStore named {name} in this transaction"
            )));
        }
        Ok(ObjectStore::new(name, self.clone()))
    }

    /// Aborts the transaction. Queued requests fail with `AbortError` and
    /// every change is rolled back.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` if the transaction already finished or is
    /// aborting.
    pub fn abort(&self) -> EngineResult<()> {
        {
            let mut phase = self.shared().phase.lock();
            if *phase != Phase::Active {
                return Err(DomError::invalid_state(
                    "The transaction has already finished.",
                ));
            }
            *phase = Phase::Aborting;
        }
        let _ = self.handle.sender.send(Message::Abort);
        Ok(())
    }

    /// Installs the complete handler.
    pub fn on_complete(&self, handler: impl FnMut(()) + Send + 'static) {
        self.shared().complete.set(Box::new(handler));
    }

    /// Installs the error handler. It runs when a request fails, before
    /// the transaction aborts.
    pub fn on_error(&self, handler: impl FnMut(ErrorEvent) + Send + 'static) {
        self.shared().error.set(Box::new(handler));
    }

    /// Installs the abort handler.
    pub fn on_abort(&self, handler: impl FnMut(ErrorEvent) + Send + 'static) {
        self.shared().abort.set(Box::new(handler));
    }

    /// Creates an object store. Only allowed in a version-change
    /// transaction.
    ///
    /// # Errors
    ///
    /// `ConstraintError` if the name is taken, `DataError` for an invalid
    /// key path, `InvalidAccessError` for a generator combined with an
    /// empty or compound key path.
    pub fn create_object_store(
        &self,
        name: &str,
        parameters: ObjectStoreParameters,
    ) -> EngineResult<ObjectStore> {
        self.check_version_change()?;
        if let Some(key_path) = &parameters.key_path {
            if !key_path.is_valid() {
                return Err(DomError::data(format!(
                    "The keyPath argument contains an invalid key path: {key_path}"
                )));
            }
            let generator_incompatible = match key_path {
                KeyPath::Path(path) => path.is_empty(),
                KeyPath::Sequence(_) => true,
            };
            if parameters.auto_increment && generator_incompatible {
                return Err(DomError::invalid_access(
                    "The autoIncrement option was set but the keyPath is empty or a sequence.",
                ));
            }
        }
        {
            let mut state = self.cell().state.lock();
            if state.stores.contains_key(name) {
                return Err(DomError::constraint(format!(
                    "An object store named {name} already exists."
                )));
            }
            state.stores.insert(
                name.to_string(),
                StoreState::new(parameters.key_path, parameters.auto_increment),
            );
        }
        trace!(transaction = self.shared().id, store = name, "object store created");
        Ok(ObjectStore::new(name, self.clone()))
    }

    /// Deletes an object store and everything in it. Only allowed in a
    /// version-change transaction.
    ///
    /// # Errors
    ///
    /// `NotFoundError` if there is no such store.
    pub fn delete_object_store(&self, name: &str) -> EngineResult<()> {
        self.check_version_change()?;
        let removed = self.cell().state.lock().stores.remove(name);
        match removed {
            Some(_) => Ok(()),
            None => Err(DomError::not_found(format!(
                "No objectStore named {name} in this database"
            ))),
        }
    }

    pub(crate) fn outcome(&self) -> watch::Receiver<Option<Outcome>> {
        self.shared().outcome.subscribe()
    }

    pub(crate) fn cell(&self) -> &DatabaseCell {
        self.shared().cell()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        self.cell().config()
    }

    pub(crate) fn read<R>(&self, read: impl FnOnce(&DatabaseState) -> R) -> R {
        read(&self.cell().state.lock())
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.shared().phase() == Phase::Finished
    }

    pub(crate) fn check_active(&self) -> EngineResult<()> {
        match self.shared().phase() {
            Phase::Active => Ok(()),
            Phase::Aborting | Phase::Finished => Err(DomError::inactive()),
        }
    }

    pub(crate) fn check_writable(&self) -> EngineResult<()> {
        self.check_active()?;
        if self.mode() == TransactionMode::ReadOnly {
            return Err(DomError::read_only());
        }
        Ok(())
    }

    pub(crate) fn check_version_change(&self) -> EngineResult<()> {
        if self.mode() != TransactionMode::VersionChange {
            return Err(DomError::invalid_state(
                "Schema changes are only allowed in a version-change transaction.",
            ));
        }
        self.check_active()
    }

    /// Queues `work` and returns the request its result arrives on.
    pub(crate) fn enqueue<T, F>(&self, work: F) -> EngineResult<Request<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Context<'_>) -> EngineResult<T> + Send + 'static,
    {
        let request = Request::new();
        self.enqueue_on(request.clone(), work)?;
        Ok(request)
    }

    /// Queues `work` whose result is delivered on an existing request.
    pub(crate) fn enqueue_on<T, F>(&self, request: Request<T>, work: F) -> EngineResult<()>
    where
        T: Send + 'static,
        F: FnOnce(&mut Context<'_>) -> EngineResult<T> + Send + 'static,
    {
        self.check_active()?;
        self.handle
            .sender
            .send(Message::Run(Job::new(request, work)))
            .map_err(|_| DomError::inactive())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.shared().id)
            .field("mode", &self.shared().mode)
            .field("phase", &self.shared().phase())
            .finish()
    }
}

/// Waits for a transaction to settle.
pub(crate) async fn settled(mut outcome: watch::Receiver<Option<Outcome>>) -> EngineResult<()> {
    let settled = outcome
        .wait_for(Option::is_some)
        .await
        .map(|settled| (*settled).clone())
        .map_err(|_| DomError::unknown("The transaction worker stopped."))?;
    match settled {
        Some(Outcome::Committed) => Ok(()),
        Some(Outcome::Aborted(error)) => Err(error),
        None => Err(DomError::unknown("The transaction did not settle.")),
    }
}
