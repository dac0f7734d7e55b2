//! In-memory database state: stores, records and index entries.

use crate::cursor::CursorDirection;
use crate::error::{DomError, EngineResult};
use keyshelf_codec::{from_cbor, to_cbor, CodecResult, Key, KeyPath, KeyRange};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Largest value a key generator hands out (2^53).
const MAX_GENERATED_KEY: u64 = 9_007_199_254_740_992;

/// Schema and contents of one database.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, StoreState>,
}

impl DatabaseState {
    pub(crate) fn store(&self, name: &str) -> EngineResult<&StoreState> {
        self.stores.get(name).ok_or_else(|| missing_store(name))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> EngineResult<&mut StoreState> {
        self.stores.get_mut(name).ok_or_else(|| missing_store(name))
    }

    /// Encodes the state as a CBOR snapshot.
    pub(crate) fn encode(&self) -> CodecResult<Vec<u8>> {
        let image = DatabaseImage {
            version: self.version,
            stores: self
                .stores
                .iter()
                .map(|(name, store)| store.to_image(name))
                .collect(),
        };
        to_cbor(&image)
    }

    /// Rebuilds state, index entries included, from a CBOR snapshot.
    pub(crate) fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let image: DatabaseImage = from_cbor(bytes)?;
        let stores = image
            .stores
            .into_iter()
            .map(|store| (store.name.clone(), StoreState::from_image(store)))
            .collect();
        Ok(Self {
            version: image.version,
            stores,
        })
    }
}

fn missing_store(name: &str) -> DomError {
    DomError::not_found(format!(
        "No objectStore named {name} in this database"
    ))
}

/// One object store.
#[derive(Debug, Clone)]
pub(crate) struct StoreState {
    key_path: Option<KeyPath>,
    auto_increment: bool,
    next_key: u64,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexState>,
}

impl StoreState {
    pub(crate) fn new(key_path: Option<KeyPath>, auto_increment: bool) -> Self {
        Self {
            key_path,
            auto_increment,
            next_key: 1,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub(crate) fn key_path(&self) -> Option<&KeyPath> {
        self.key_path.as_ref()
    }

    pub(crate) fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub(crate) fn index(&self, name: &str) -> EngineResult<&IndexState> {
        self.indexes.get(name).ok_or_else(|| {
            DomError::not_found(format!("No index named {name} in this object store"))
        })
    }

    pub(crate) fn generator(&self) -> u64 {
        self.next_key
    }

    pub(crate) fn set_generator(&mut self, next_key: u64) {
        self.next_key = next_key;
    }

    /// Checks that a key can be determined for `value` without storing
    /// anything.
    pub(crate) fn check_key(&self, value: &Value, key: Option<&Key>) -> EngineResult<()> {
        match (&self.key_path, key) {
            (Some(_), Some(_)) => Err(DomError::data(
                "The object store uses in-line keys and the key parameter was provided.",
            )),
            (Some(path), None) => {
                let generated = self.auto_increment && path.locate(value).is_none();
                if generated || path.evaluate(value).is_some() {
                    Ok(())
                } else {
                    Err(DomError::data(
                        "Evaluating the object store's key path did not yield a value.",
                    ))
                }
            }
            (None, Some(_)) => Ok(()),
            (None, None) if self.auto_increment => Ok(()),
            (None, None) => Err(DomError::data(
                "The object store uses out-of-line keys and has no key generator and the key parameter was not provided.",
            )),
        }
    }

    /// Works out the primary key for a record about to be stored,
    /// generating one (and writing it into the record) when the store has
    /// a key generator and the record carries none.
    pub(crate) fn resolve_key(&mut self, value: &mut Value, key: Option<Key>) -> EngineResult<Key> {
        self.check_key(value, key.as_ref())?;
        if let Some(key) = key {
            self.observe(&key);
            return Ok(key);
        }
        let Some(path) = self.key_path.clone() else {
            return self.generate();
        };
        if let Some(key) = path.evaluate(value) {
            self.observe(&key);
            return Ok(key);
        }
        let key = self.generate()?;
        path.inject(value, &key)?;
        Ok(key)
    }

    fn generate(&mut self) -> EngineResult<Key> {
        if self.next_key > MAX_GENERATED_KEY {
            return Err(DomError::constraint(
                "The key generator has reached its maximum value.",
            ));
        }
        let key = Key::from(self.next_key);
        self.next_key += 1;
        Ok(key)
    }

    // Explicit numeric keys push the generator past them.
    fn observe(&mut self, key: &Key) {
        if !self.auto_increment {
            return;
        }
        if let Some(n) = key.as_number() {
            if n >= self.next_key as f64 {
                let floor = n.min(MAX_GENERATED_KEY as f64).floor() as u64;
                self.next_key = floor.saturating_add(1);
            }
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&Value> {
        self.records.get(key)
    }

    /// Stores a record, returning the record it replaced.
    pub(crate) fn put(
        &mut self,
        key: Key,
        value: Value,
        no_overwrite: bool,
    ) -> EngineResult<Option<Value>> {
        if no_overwrite && self.records.contains_key(&key) {
            return Err(DomError::constraint(
                "Key already exists in the object store.",
            ));
        }
        for (name, index) in &self.indexes {
            if index.unique && index.conflicts(&index.keys_for(&value), &key) {
                return Err(DomError::constraint(format!(
                    "Unable to add key to index '{name}': at least one key does not satisfy the uniqueness requirements."
                )));
            }
        }
        let previous = self.remove(&key);
        self.insert_unchecked(key, value);
        Ok(previous)
    }

    fn insert_unchecked(&mut self, key: Key, value: Value) {
        for index in self.indexes.values_mut() {
            let keys = index.keys_for(&value);
            index.add(&key, keys);
        }
        self.records.insert(key, value);
    }

    /// Removes a record and its index entries.
    pub(crate) fn remove(&mut self, key: &Key) -> Option<Value> {
        let previous = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            let keys = index.keys_for(&previous);
            index.remove(key, &keys);
        }
        Some(previous)
    }

    /// Puts a record back to the given prior state.
    pub(crate) fn restore(&mut self, key: &Key, previous: Option<Value>) {
        self.remove(key);
        if let Some(value) = previous {
            self.insert_unchecked(key.clone(), value);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        let (lower, upper) = span(range, None, true);
        if is_empty_span(lower, upper) {
            return 0;
        }
        self.records.range::<Key, _>((lower, upper)).count() as u64
    }

    /// Records in key order, optionally limited.
    pub(crate) fn entries(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> Vec<(&Key, &Value)> {
        let (lower, upper) = span(range, None, true);
        if is_empty_span(lower, upper) {
            return Vec::new();
        }
        self.records
            .range::<Key, _>((lower, upper))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// The first record in `range`.
    pub(crate) fn first(&self, range: &KeyRange) -> Option<(&Key, &Value)> {
        step(&self.records, Some(range), true, None)
    }

    /// The record a store cursor moves to after `after`.
    pub(crate) fn step(
        &self,
        range: Option<&KeyRange>,
        direction: CursorDirection,
        after: Option<&Key>,
    ) -> Option<(&Key, &Value)> {
        step(&self.records, range, direction.is_forward(), after)
    }

    pub(crate) fn create_index(&mut self, name: &str, mut index: IndexState) -> EngineResult<()> {
        if self.indexes.contains_key(name) {
            return Err(DomError::constraint(format!(
                "An index named {name} already exists."
            )));
        }
        for (key, value) in &self.records {
            let keys = index.keys_for(value);
            if index.unique && index.conflicts(&keys, key) {
                return Err(DomError::constraint(format!(
                    "Unable to add key to index '{name}': at least one key does not satisfy the uniqueness requirements."
                )));
            }
            index.add(key, keys);
        }
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes.remove(name).map(|_| ()).ok_or_else(|| {
            DomError::not_found(format!("No index named {name} in this object store"))
        })
    }

    fn to_image(&self, name: &str) -> StoreImage {
        StoreImage {
            name: name.to_string(),
            key_path: self.key_path.clone(),
            auto_increment: self.auto_increment,
            next_key: self.next_key,
            indexes: self
                .indexes
                .iter()
                .map(|(name, index)| IndexImage {
                    name: name.clone(),
                    key_path: index.key_path.clone(),
                    unique: index.unique,
                    multi_entry: index.multi_entry,
                })
                .collect(),
            records: self
                .records
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn from_image(image: StoreImage) -> Self {
        let mut store = StoreState::new(image.key_path, image.auto_increment);
        store.next_key = image.next_key;
        for index in image.indexes {
            store.indexes.insert(
                index.name,
                IndexState::new(index.key_path, index.unique, index.multi_entry),
            );
        }
        for (key, value) in image.records {
            store.insert_unchecked(key, value);
        }
        store
    }
}

/// One index: index key to the primary keys of the records carrying it.
#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    key_path: KeyPath,
    unique: bool,
    multi_entry: bool,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexState {
    pub(crate) fn new(key_path: KeyPath, unique: bool, multi_entry: bool) -> Self {
        Self {
            key_path,
            unique,
            multi_entry,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    pub(crate) fn unique(&self) -> bool {
        self.unique
    }

    pub(crate) fn multi_entry(&self) -> bool {
        self.multi_entry
    }

    /// Index keys a record contributes. Records without a valid key at the
    /// key path are simply not indexed.
    fn keys_for(&self, value: &Value) -> Vec<Key> {
        if self.multi_entry {
            if let Some(Value::Array(items)) = self.key_path.locate(value) {
                let keys: BTreeSet<Key> = items.iter().filter_map(Key::from_value).collect();
                return keys.into_iter().collect();
            }
        }
        self.key_path.evaluate(value).into_iter().collect()
    }

    fn conflicts(&self, keys: &[Key], primary: &Key) -> bool {
        keys.iter().any(|key| {
            self.entries
                .get(key)
                .is_some_and(|owners| owners.iter().any(|owner| owner != primary))
        })
    }

    fn add(&mut self, primary: &Key, keys: Vec<Key>) {
        for key in keys {
            self.entries.entry(key).or_default().insert(primary.clone());
        }
    }

    fn remove(&mut self, primary: &Key, keys: &[Key]) {
        for key in keys {
            if let Some(owners) = self.entries.get_mut(key) {
                owners.remove(primary);
                if owners.is_empty() {
                    self.entries.remove(key);
                }
            }
        }
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        let (lower, upper) = span(range, None, true);
        if is_empty_span(lower, upper) {
            return 0;
        }
        self.entries
            .range::<Key, _>((lower, upper))
            .map(|(_, owners)| owners.len() as u64)
            .sum()
    }

    /// Primary keys in index order, optionally limited.
    pub(crate) fn primary_keys(&self, range: Option<&KeyRange>, limit: Option<usize>) -> Vec<Key> {
        let (lower, upper) = span(range, None, true);
        if is_empty_span(lower, upper) {
            return Vec::new();
        }
        self.entries
            .range::<Key, _>((lower, upper))
            .flat_map(|(_, owners)| owners.iter().cloned())
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// The position an index cursor moves to after `after`, as
    /// `(index key, primary key)`.
    pub(crate) fn step(
        &self,
        range: Option<&KeyRange>,
        direction: CursorDirection,
        after: Option<(&Key, &Key)>,
    ) -> Option<(Key, Key)> {
        let forward = direction.is_forward();
        let unique = direction.is_unique();
        if let Some((index_key, primary)) = after {
            if !unique {
                if let Some(owners) = self.entries.get(index_key) {
                    let next = if forward {
                        owners.range::<Key, _>((Bound::Excluded(primary), Bound::Unbounded)).next()
                    } else {
                        owners
                            .range::<Key, _>((Bound::Unbounded, Bound::Excluded(primary)))
                            .next_back()
                    };
                    if let Some(next) = next {
                        return Some((index_key.clone(), next.clone()));
                    }
                }
            }
        }
        let (index_key, owners) = step(&self.entries, range, forward, after.map(|(k, _)| k))?;
        // Unique directions always report the lowest primary key.
        let primary = if forward || unique {
            owners.iter().next()
        } else {
            owners.iter().next_back()
        };
        primary.map(|primary| (index_key.clone(), primary.clone()))
    }
}

fn span<'a>(
    range: Option<&'a KeyRange>,
    after: Option<&'a Key>,
    forward: bool,
) -> (Bound<&'a Key>, Bound<&'a Key>) {
    let (mut lower, mut upper) =
        range.map_or((Bound::Unbounded, Bound::Unbounded), KeyRange::bounds);
    if let Some(last) = after {
        if forward {
            lower = Bound::Excluded(last);
        } else {
            upper = Bound::Excluded(last);
        }
    }
    (lower, upper)
}

// BTreeMap::range panics on inverted bounds, so those are checked first.
fn is_empty_span(lower: Bound<&Key>, upper: Bound<&Key>) -> bool {
    match (lower, upper) {
        (
            Bound::Included(low) | Bound::Excluded(low),
            Bound::Included(high) | Bound::Excluded(high),
        ) => {
            let closed = matches!(lower, Bound::Included(_)) && matches!(upper, Bound::Included(_));
            low > high || (low == high && !closed)
        }
        _ => false,
    }
}

fn step<'a, V>(
    map: &'a BTreeMap<Key, V>,
    range: Option<&KeyRange>,
    forward: bool,
    after: Option<&Key>,
) -> Option<(&'a Key, &'a V)> {
    let (lower, upper) = span(range, after, forward);
    if is_empty_span(lower, upper) {
        return None;
    }
    let mut entries = map.range::<Key, _>((lower, upper));
    if forward {
        entries.next()
    } else {
        entries.next_back()
    }
}

#[derive(Serialize, Deserialize)]
struct DatabaseImage {
    version: u64,
    stores: Vec<StoreImage>,
}

#[derive(Serialize, Deserialize)]
struct StoreImage {
    name: String,
    key_path: Option<KeyPath>,
    auto_increment: bool,
    next_key: u64,
    indexes: Vec<IndexImage>,
    records: Vec<(Key, Value)>,
}

#[derive(Serialize, Deserialize)]
struct IndexImage {
    name: String,
    key_path: KeyPath,
    unique: bool,
    multi_entry: bool,
}
