//! Index handles.

use crate::cursor::{Cursor, CursorDirection, CursorSource};
use crate::error::{DomError, EngineResult, ErrorName};
use crate::request::Request;
use crate::state::IndexState;
use crate::transaction::Transaction;
use keyshelf_codec::{Key, KeyPath, KeyRange};
use serde_json::Value;
use std::fmt;

/// Options for [`crate::ObjectStore::create_index`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexParameters {
    /// Whether two records may not share an index key.
    pub unique: bool,
    /// Whether an array at the key path indexes each element separately.
    pub multi_entry: bool,
}

impl IndexParameters {
    /// Creates parameters for a plain, non-unique index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets uniqueness.
    #[must_use]
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Sets multi-entry indexing.
    #[must_use]
    pub const fn multi_entry(mut self, value: bool) -> Self {
        self.multi_entry = value;
        self
    }
}

/// A handle to one index inside a transaction.
#[derive(Clone)]
pub struct Index {
    store: String,
    name: String,
    transaction: Transaction,
}

impl Index {
    pub(crate) fn new(store: &str, name: &str, transaction: Transaction) -> Self {
        Self {
            store: store.to_string(),
            name: name.to_string(),
            transaction,
        }
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the store the index belongs to.
    #[must_use]
    pub fn object_store_name(&self) -> &str {
        &self.store
    }

    /// Returns the key path.
    #[must_use]
    pub fn key_path(&self) -> Option<KeyPath> {
        self.inspect(|index| index.key_path().clone())
    }

    /// Returns whether the index is unique.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.inspect(IndexState::unique).unwrap_or(false)
    }

    /// Returns whether the index is multi-entry.
    #[must_use]
    pub fn multi_entry(&self) -> bool {
        self.inspect(IndexState::multi_entry).unwrap_or(false)
    }

    fn inspect<R>(&self, read: impl FnOnce(&IndexState) -> R) -> Option<R> {
        self.transaction.read(|state| {
            state
                .store(&self.store)
                .and_then(|store| store.index(&self.name))
                .ok()
                .map(read)
        })
    }

    /// Reads the first record (in primary key order) whose index key is
    /// `key`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn get(&self, key: Key) -> EngineResult<Request<Option<Value>>> {
        let (store, name) = (self.store.clone(), self.name.clone());
        self.transaction.enqueue(move |ctx| {
            let target = ctx.state().store(&store)?;
            let primary = target
                .index(&name)?
                .primary_keys(Some(&KeyRange::only(key)), Some(1));
            Ok(primary.first().and_then(|pk| target.get(pk)).cloned())
        })
    }

    /// Reads the primary key of the first record whose index key is `key`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn get_key(&self, key: Key) -> EngineResult<Request<Option<Key>>> {
        let (store, name) = (self.store.clone(), self.name.clone());
        self.transaction.enqueue(move |ctx| {
            let primary = ctx
                .state()
                .store(&store)?
                .index(&name)?
                .primary_keys(Some(&KeyRange::only(key)), Some(1));
            Ok(primary.into_iter().next())
        })
    }

    /// Counts the entries whose index key lies in `range`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn count(&self, range: Option<KeyRange>) -> EngineResult<Request<u64>> {
        let (store, name) = (self.store.clone(), self.name.clone());
        self.transaction.enqueue(move |ctx| {
            Ok(ctx
                .state()
                .store(&store)?
                .index(&name)?
                .count(range.as_ref()))
        })
    }

    /// Reads the records whose index key lies in `range`, in index order.
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
        let (store, name) = (self.store.clone(), self.name.clone());
        self.transaction.enqueue(move |ctx| {
            let target = ctx.state().store(&store)?;
            let primary = target.index(&name)?.primary_keys(range.as_ref(), limit);
            Ok(primary
                .iter()
                .filter_map(|pk| target.get(pk).cloned())
                .collect())
        })
    }

    /// Reads the primary keys of the records whose index key lies in
    /// `range`, in index order.
    ///
    /// # Errors
    ///
    /// As for [`Index::get_all`].
    pub fn get_all_keys(
        &self,
        range: Option<KeyRange>,
        limit: Option<usize>,
    ) -> EngineResult<Request<Vec<Key>>> {
        self.require_bulk_reads("getAllKeys")?;
        let (store, name) = (self.store.clone(), self.name.clone());
        self.transaction.enqueue(move |ctx| {
            Ok(ctx
                .state()
                .store(&store)?
                .index(&name)?
                .primary_keys(range.as_ref(), limit))
        })
    }

    /// Opens a cursor over the records whose index key lies in `range`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError`.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> EngineResult<Request<Option<Cursor>>> {
        let source = CursorSource::Index {
            store: self.store.clone(),
            index: self.name.clone(),
        };
        Cursor::open(&self.transaction, source, range, direction)
    }

    fn require_bulk_reads(&self, operation: &str) -> EngineResult<()> {
        if self.transaction.config().bulk_reads {
            Ok(())
        } else {
            Err(DomError::new(
                ErrorName::TypeError,
                format!("{operation} is not supported by this engine."),
            ))
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("store", &self.store)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
