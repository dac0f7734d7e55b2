//! Connections to a named database.

use crate::database::DatabaseCell;
use crate::error::{DomError, EngineResult, ErrorName};
use crate::transaction::{Transaction, TransactionMode};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

struct ConnectionInner {
    id: u64,
    version: u64,
    cell: Arc<DatabaseCell>,
    closed: AtomicBool,
}

impl ConnectionInner {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cell.connection_closed();
            trace!(connection = self.id, database = self.cell.name(), "connection closed");
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// An open connection to one database.
///
/// Clones share the connection. It closes on [`Connection::close`] or when
/// the last clone (including those held by its transactions) is dropped.
/// Opens and deletes that need exclusive access wait until every
/// connection to the database has closed.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn open(cell: Arc<DatabaseCell>) -> Self {
        cell.connection_opened();
        let inner = ConnectionInner {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            version: cell.version(),
            cell,
            closed: AtomicBool::new(false),
        };
        trace!(connection = inner.id, database = inner.cell.name(), "connection opened");
        Self {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn cell(&self) -> &DatabaseCell {
        &self.inner.cell
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.cell.name()
    }

    /// Returns the version the connection was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// Returns the names of the database's object stores, sorted.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.inner.cell.state.lock().stores.keys().cloned().collect()
    }

    /// Closes the connection. Transactions already started still run to
    /// completion. Closing twice is a no-op.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns whether [`Connection::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Starts a transaction over `names`.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` on a closed connection, `TypeError` for
    /// [`TransactionMode::VersionChange`] (only an open can start one),
    /// `InvalidAccessError` for an empty scope and `NotFoundError` for a
    /// store that does not exist.
    pub fn transaction<I, S>(&self, names: I, mode: TransactionMode) -> EngineResult<Transaction>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.is_closed() {
            return Err(DomError::invalid_state("The database connection is closing."));
        }
        if mode == TransactionMode::VersionChange {
            return Err(DomError::new(
                ErrorName::TypeError,
                "A version-change transaction can only be started by an open request.",
            ));
        }
        let mut scope: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        if scope.is_empty() {
            return Err(DomError::invalid_access(
                "The storeNames parameter was empty.",
            ));
        }
        scope.sort();
        scope.dedup();
        {
            let state = self.inner.cell.state.lock();
            if let Some(missing) = scope.iter().find(|n| !state.stores.contains_key(*n)) {
                return Err(DomError::not_found(format!(
                    "No objectStore named {missing} in this database"
                )));
            }
        }
        Transaction::begin(self, scope, mode, None)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("version", &self.inner.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}
