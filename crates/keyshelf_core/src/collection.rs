//! Collections: one store inside one open transaction.

use crate::cursor::iterate;
use crate::deferred::{Deferred, Promise};
use crate::error::{CoreError, CoreResult};
use crate::query::{EachOptions, RangeQuery};
use crate::transaction::Completion;
use keyshelf_codec::{Key, KeyPath};
use keyshelf_engine::{CursorDirection, EngineResult, ObjectStore, Request};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// A view over one store inside one open transaction.
///
/// Every method issues its engine requests immediately and returns a
/// [`Promise`]; dropping the promise does not cancel the work. Holding a
/// collection keeps its transaction open.
pub struct Collection {
    store: ObjectStore,
    completion: Completion,
}

impl Collection {
    pub(crate) fn new(store: ObjectStore, completion: Completion) -> Self {
        Self { store, completion }
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Returns the store's key path, `None` for out-of-line keys.
    #[must_use]
    pub fn key_path(&self) -> Option<KeyPath> {
        self.store.key_path()
    }

    /// Returns whether the store generates keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.store.auto_increment()
    }

    /// Returns the store's index names, sorted.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.store.index_names()
    }

    /// Returns the completion future of the owning transaction.
    #[must_use]
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Returns a fresh query for [`Collection::each_where`].
    #[must_use]
    pub fn query(&self) -> RangeQuery {
        RangeQuery::new()
    }

    /// Reads every primary key in store order.
    pub fn get_all_keys(&self) -> Promise<Vec<Key>> {
        if self.store.supports_bulk_reads() {
            return settle(self.store.get_all_keys(None, None));
        }
        let opened = self.store.open_cursor(None, CursorDirection::Next);
        iterate(opened, |cursor| cursor.key().clone()).without_progress()
    }

    /// Reads every record in store order.
    pub fn get_all(&self) -> Promise<Vec<Value>> {
        if self.store.supports_bulk_reads() {
            return settle(self.store.get_all(None, None));
        }
        let opened = self.store.open_cursor(None, CursorDirection::Next);
        iterate(opened, |cursor| cursor.value().clone()).without_progress()
    }

    /// Deletes every record.
    pub fn clear(&self) -> Promise<()> {
        settle(self.store.clear())
    }

    /// Deletes the record at `key`. A missing key is not an error.
    pub fn delete(&self, key: impl Into<Key>) -> Promise<()> {
        settle(self.store.delete(key.into()))
    }

    /// Adds new records. A JSON array is a batch of records, anything else
    /// a single record.
    ///
    /// Resolves with the keys once every record was stored, notifying each
    /// key as it is. An existing key rejects the promise and aborts the
    /// transaction.
    pub fn insert(&self, data: Value) -> Promise<Vec<Key>, Key> {
        self.write_batch(batch(data), true)
    }

    /// Adds every record of `items`, as [`Collection::insert`] does.
    pub fn insert_many(&self, items: impl IntoIterator<Item = Value>) -> Promise<Vec<Key>, Key> {
        self.write_batch(items.into_iter().collect(), true)
    }

    /// Stores records, replacing those whose key already exists. A JSON
    /// array is a batch of records.
    pub fn upsert(&self, data: Value) -> Promise<Vec<Key>, Key> {
        self.write_batch(batch(data), false)
    }

    /// Stores every record of `items`, as [`Collection::upsert`] does.
    pub fn upsert_many(&self, items: impl IntoIterator<Item = Value>) -> Promise<Vec<Key>, Key> {
        self.write_batch(items.into_iter().collect(), false)
    }

    fn write_batch(&self, items: Vec<Value>, no_overwrite: bool) -> Promise<Vec<Key>, Key> {
        if items.is_empty() {
            return Promise::resolved(Vec::new());
        }
        let total = items.len();
        let (deferred, promise) = Deferred::new();
        let stored = Arc::new(Mutex::new(Vec::with_capacity(total)));
        for item in items {
            let issued = if no_overwrite {
                self.store.add(item, None)
            } else {
                self.store.put(item, None)
            };
            let request = match issued {
                Ok(request) => request,
                Err(error) => {
                    deferred.reject(error.into());
                    // A batch is all or nothing.
                    if let Err(error) = self.store.transaction().abort() {
                        trace!(
                            store = self.name(),
                            error = %error,
                            "transaction already finishing"
                        );
                    }
                    break;
                }
            };
            deferred.reject_with(&request);
            let stored = Arc::clone(&stored);
            let on_success = deferred.clone();
            request.on_success(move |key: Key| {
                let mut keys = stored.lock();
                keys.push(key.clone());
                on_success.notify(key);
                if keys.len() == total {
                    on_success.resolve(std::mem::take(&mut *keys));
                }
            });
        }
        promise
    }

    /// Counts the records.
    pub fn count(&self) -> Promise<u64> {
        settle(self.store.count(None))
    }

    /// Reads the record at `key`, rejecting with
    /// [`CoreError::NotFound`] when there is none. A missing record does
    /// not abort the transaction.
    pub fn find(&self, key: impl Into<Key>) -> Promise<Value> {
        let key = key.into();
        let request = match self.store.get(key.clone()) {
            Ok(request) => request,
            Err(error) => return Promise::rejected(error.into()),
        };
        let (deferred, promise) = Deferred::new();
        deferred.reject_with(&request);
        let store = self.name().to_string();
        request.on_success(move |found: Option<Value>| match found {
            Some(value) => deferred.resolve(value),
            None => deferred.reject(CoreError::not_found(store.clone(), &key)),
        });
        promise
    }

    /// Reads the record at `key` and deserializes it.
    pub fn find_as<T: DeserializeOwned>(
        &self,
        key: impl Into<Key>,
    ) -> impl Future<Output = CoreResult<T>> + Send {
        let found = self.find(key);
        async move {
            let value = found.await?;
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Reads the first record whose `index` key equals `key`.
    pub fn find_by(&self, index: &str, key: impl Into<Key>) -> Promise<Option<Value>> {
        match self.store.index(index) {
            Ok(index) => settle(index.get(key.into())),
            Err(error) => Promise::rejected(error.into()),
        }
    }

    /// Visits the records in primary key order, notifying each and
    /// resolving with all of them.
    pub fn each(&self, options: &EachOptions) -> Promise<Vec<Value>, Value> {
        self.each_where(&options.to_query(None))
    }

    /// Visits the records in the order of `index`.
    pub fn each_by(&self, index: &str, options: &EachOptions) -> Promise<Vec<Value>, Value> {
        self.each_where(&options.to_query(Some(index)))
    }

    /// Visits the records matching `query`.
    pub fn each_where(&self, query: &RangeQuery) -> Promise<Vec<Value>, Value> {
        let range = match query.key_range() {
            Ok(range) => range,
            Err(error) => return Promise::rejected(error),
        };
        let direction = query.direction();
        let opened = match query.index_name() {
            Some(index) => self
                .store
                .index(index)
                .and_then(|index| index.open_cursor(range, direction)),
            None => self.store.open_cursor(range, direction),
        };
        iterate(opened, |cursor| cursor.value().clone())
    }

    /// Same as [`Collection::each_where`].
    pub fn find_where(&self, query: &RangeQuery) -> Promise<Vec<Value>, Value> {
        self.each_where(query)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("store", &self.store)
            .field("completion", &self.completion)
            .finish()
    }
}

fn batch(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        item => vec![item],
    }
}

fn settle<T: Send + 'static>(issued: EngineResult<Request<T>>) -> Promise<T> {
    match issued {
        Ok(request) => {
            let (deferred, promise) = Deferred::new();
            deferred.resolve_with(&request);
            promise
        }
        Err(error) => Promise::rejected(error.into()),
    }
}
