//! Object store handles.

use crate::cursor::{Cursor, CursorDirection, CursorSource};
use crate::error::{DomError, EngineResult, ErrorName};
use crate::index::{Index, IndexParameters};
use crate::request::Request;
use crate::state::IndexState;
use crate::transaction::Transaction;
use keyshelf_codec::{Key, KeyPath, KeyRange};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// A handle to one object store inside a transaction.
///
/// Every request method validates synchronously (returning `Err` for a
/// read-only write, a finished transaction or a missing key) and otherwise
/// returns a [`Request`] whose result arrives asynchronously.
#[derive(Clone)]
pub struct ObjectStore {
    name: String,
    transaction: Transaction,
}

impl ObjectStore {
    pub(crate) fn new(name: &str, transaction: Transaction) -> Self {
        Self {
            name: name.to_string(),
            transaction,
        }
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the transaction this handle belongs to.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Returns the key path, or `None` for out-of-line keys.
    #[must_use]
    pub fn key_path(&self) -> Option<KeyPath> {
        self.transaction.read(|state| {
            state
                .store(&self.name)
                .ok()
                .and_then(|store| store.key_path().cloned())
        })
    }

    /// Returns whether the store generates keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.transaction.read(|state| {
            state
                .store(&self.name)
                .map(|store| store.auto_increment())
                .unwrap_or(false)
        })
    }

    /// Returns the index names, sorted.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.transaction.read(|state| {
            state
                .store(&self.name)
                .map(|store| store.index_names())
                .unwrap_or_default()
        })
    }

    /// Returns whether `get_all` and `get_all_keys` are available.
    #[must_use]
    pub fn supports_bulk_reads(&self) -> bool {
        self.transaction.config().bulk_reads
    }

    /// Stores a record, replacing any record with the same key.
    ///
    /// `key` must be given for out-of-line stores without a generator and
    /// must be omitted for stores with a key path.
    ///
    /// # Errors
    ///
    /// `ReadOnlyError`, `TransactionInactiveError`, or `DataError` when the
    /// key cannot be determined.
    pub fn put(&self, value: Value, key: Option<Key>) -> EngineResult<Request<Key>> {
        self.write(value, key, false)
    }

    /// Stores a record that must not exist yet. A duplicate key fails the
    /// request with `ConstraintError` and aborts the transaction.
    ///
    /// # Errors
    ///
    /// As for [`ObjectStore::put`].
    pub fn add(&self, value: Value, key: Option<Key>) -> EngineResult<Request<Key>> {
        self.write(value, key, true)
    }

    fn write(
        &self,
        value: Value,
        key: Option<Key>,
        no_overwrite: bool,
    ) -> EngineResult<Request<Key>> {
        self.transaction.check_writable()?;
        self.transaction
            .read(|state| state.store(&self.name)?.check_key(&value, key.as_ref()))?;
        let store = self.name.clone();
        self.transaction
            .enqueue(move |ctx| ctx.put(&store, value, key, no_overwrite))
    }

    /// Reads the record stored under `key`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn get(&self, key: Key) -> EngineResult<Request<Option<Value>>> {
        let store = self.name.clone();
        self.transaction
            .enqueue(move |ctx| Ok(ctx.state().store(&store)?.get(&key).cloned()))
    }

    /// Deletes the record stored under `key`; deleting a missing key
    /// succeeds.
    ///
    /// # Errors
    ///
    /// `ReadOnlyError` or `TransactionInactiveError`.
    pub fn delete(&self, key: Key) -> EngineResult<Request<()>> {
        self.transaction.check_writable()?;
        let store = self.name.clone();
        self.transaction.enqueue(move |ctx| ctx.delete(&store, &key))
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// `ReadOnlyError` or `TransactionInactiveError`.
    pub fn clear(&self) -> EngineResult<Request<()>> {
        self.transaction.check_writable()?;
        let store = self.name.clone();
        self.transaction.enqueue(move |ctx| ctx.clear(&store))
    }

    /// Counts the records in `range` (all records for `None`).
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn count(&self, range: Option<KeyRange>) -> EngineResult<Request<u64>> {
        let store = self.name.clone();
        self.transaction
            .enqueue(move |ctx| Ok(ctx.state().store(&store)?.count(range.as_ref())))
    }

    /// Reads the records in `range`, in key order.
    ///
    /// # Errors
    ///
    /// `TypeError` when the engine is configured without bulk reads, or
    /// `TransactionInactiveError`.
    pub fn get_all(
        &self,
        range: Option<KeyRange>,
        limit: Option<usize>,
    ) -> EngineResult<Request<Vec<Value>>> {
        self.require_bulk_reads("getAll")?;
        let store = self.name.clone();
        self.transaction.enqueue(move |ctx| {
            let entries = ctx.state().store(&store)?.entries(range.as_ref(), limit);
            Ok(entries.into_iter().map(|(_, value)| value.clone()).collect())
        })
    }

    /// Reads the keys in `range`, in key order.
    ///
    /// # Errors
    ///
    /// As for [`ObjectStore::get_all`].
    pub fn get_all_keys(
        &self,
        range: Option<KeyRange>,
        limit: Option<usize>,
    ) -> EngineResult<Request<Vec<Key>>> {
        self.require_bulk_reads("getAllKeys")?;
        let store = self.name.clone();
        self.transaction.enqueue(move |ctx| {
            let entries = ctx.state().store(&store)?.entries(range.as_ref(), limit);
            Ok(entries.into_iter().map(|(key, _)| key.clone()).collect())
        })
    }

    /// Opens a cursor over the records in `range`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> EngineResult<Request<Option<Cursor>>> {
        let source = CursorSource::Store {
            store: self.name.clone(),
        };
        Cursor::open(&self.transaction, source, range, direction)
    }

    /// Returns a handle to an index of this store.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` once the transaction finished, `NotFoundError`
    /// if there is no such index.
    pub fn index(&self, name: &str) -> EngineResult<Index> {
        if self.transaction.is_finished() {
            return Err(DomError::invalid_state("The transaction has finished."));
        }
        self.transaction
            .read(|state| state.store(&self.name)?.index(name).map(|_| ()))?;
        Ok(Index::new(&self.name, name, self.transaction.clone()))
    }

    /// Creates an index. Only allowed in a version-change transaction.
    ///
    /// # Errors
    ///
    /// `ConstraintError` if the name is taken or existing records violate a
    /// unique index, `DataError` for an invalid key path and
    /// `InvalidAccessError` for a multi-entry index over a compound key
    /// path.
    pub fn create_index(
        &self,
        name: &str,
        key_path: impl Into<KeyPath>,
        parameters: IndexParameters,
    ) -> EngineResult<Index> {
        self.transaction.check_version_change()?;
        let key_path = key_path.into();
        if !key_path.is_valid() {
            return Err(DomError::data(format!(
                "The keyPath argument contains an invalid key path: {key_path}"
            )));
        }
        if parameters.multi_entry && matches!(key_path, KeyPath::Sequence(_)) {
            return Err(DomError::invalid_access(
                "The keyPath argument was a sequence and the multiEntry option is true.",
            ));
        }
        {
            let mut state = self.transaction.cell().state.lock();
            let store = state.store_mut(&self.name)?;
            store.create_index(
                name,
                IndexState::new(key_path, parameters.unique, parameters.multi_entry),
            )?;
        }
        trace!(store = %self.name, index = name, "index created");
        Ok(Index::new(&self.name, name, self.transaction.clone()))
    }

    /// Deletes an index. Only allowed in a version-change transaction.
    ///
    /// # Errors
    ///
    /// `NotFoundError` if there is no such index.
    pub fn delete_index(&self, name: &str) -> EngineResult<()> {
        self.transaction.check_version_change()?;
        let mut state = self.transaction.cell().state.lock();
        state.store_mut(&self.name)?.delete_index(name)
    }

    fn require_bulk_reads(&self, operation: &str) -> EngineResult<()> {
        if self.supports_bulk_reads() {
            Ok(())
        } else {
            Err(DomError::new(
                ErrorName::TypeError,
                format!("{operation} is not supported by this engine."),
            ))
        }
    }
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.name)
            .field("transaction", &self.transaction)
            .finish()
    }
}
