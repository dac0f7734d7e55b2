//! Cursors over object stores and indexes.

use crate::error::{DomError, EngineResult};
use crate::request::Request;
use crate::state::DatabaseState;
use crate::transaction::Transaction;
use keyshelf_codec::{Key, KeyRange};
use serde_json::Value;
use std::fmt;

/// Order in which a cursor visits records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDirection {
    /// Ascending key order.
    #[default]
    Next,
    /// Ascending, visiting each distinct index key once.
    NextUnique,
    /// Descending key order.
    Prev,
    /// Descending, visiting each distinct index key once.
    PrevUnique,
}

impl CursorDirection {
    /// Returns true for the ascending directions.
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, CursorDirection::Next | CursorDirection::NextUnique)
    }

    /// Returns true for the unique directions.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, CursorDirection::NextUnique | CursorDirection::PrevUnique)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CursorSource {
    Store { store: String },
    Index { store: String, index: String },
}

struct Walk {
    source: CursorSource,
    range: Option<KeyRange>,
    direction: CursorDirection,
}

/// A position in an iteration.
///
/// Each step arrives as a success event on the request returned by
/// `open_cursor`: `Some(cursor)` while records remain, then `None`. A
/// cursor keeps its transaction alive until it is either continued or
/// dropped.
pub struct Cursor {
    key: Key,
    primary_key: Key,
    value: Value,
    walk: Walk,
    transaction: Transaction,
    request: Request<Option<Cursor>>,
}

impl Cursor {
    pub(crate) fn open(
        transaction: &Transaction,
        source: CursorSource,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> EngineResult<Request<Option<Cursor>>> {
        let request = Request::new();
        let walk = Walk {
            source,
            range,
            direction,
        };
        schedule(transaction.clone(), request.clone(), walk, None)?;
        Ok(request)
    }

    /// The key at the cursor: the primary key for store cursors, the index
    /// key for index cursors.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The primary key of the record at the cursor.
    #[must_use]
    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// The record at the cursor.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The iteration direction.
    #[must_use]
    pub fn direction(&self) -> CursorDirection {
        self.walk.direction
    }

    /// Moves to the next record. The result arrives on the request the
    /// cursor was opened with.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` if the transaction is aborting.
    pub fn continue_(self) -> EngineResult<()> {
        let Cursor {
            key,
            primary_key,
            walk,
            transaction,
            request,
            ..
        } = self;
        schedule(transaction, request, walk, Some((key, primary_key)))
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("source", &self.walk.source)
            .field("direction", &self.walk.direction)
            .field("key", &self.key)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

fn schedule(
    transaction: Transaction,
    request: Request<Option<Cursor>>,
    walk: Walk,
    after: Option<(Key, Key)>,
) -> EngineResult<()> {
    let handle = transaction.clone();
    let target = request.clone();
    transaction.enqueue_on(request, move |ctx| {
        let found = locate(ctx.state(), &walk, after.as_ref())?;
        Ok(found.map(|(key, primary_key, value)| Cursor {
            key,
            primary_key,
            value,
            walk,
            transaction: handle,
            request: target,
        }))
    })
}

fn locate(
    state: &DatabaseState,
    walk: &Walk,
    after: Option<&(Key, Key)>,
) -> EngineResult<Option<(Key, Key, Value)>> {
    let range = walk.range.as_ref();
    match &walk.source {
        CursorSource::Store { store } => {
            let store = state.store(store)?;
            let found = store.step(range, walk.direction, after.map(|(key, _)| key));
            Ok(found.map(|(key, value)| (key.clone(), key.clone(), value.clone())))
        }
        CursorSource::Index { store, index } => {
            let store = state.store(store)?;
            let position = store.index(index)?.step(
                range,
                walk.direction,
                after.map(|(key, primary)| (key, primary)),
            );
            let Some((key, primary_key)) = position else {
                return Ok(None);
            };
            let value = store
                .get(&primary_key)
                .cloned()
                .ok_or_else(|| DomError::unknown("Index entry refers to a missing record."))?;
            Ok(Some((key, primary_key, value)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_flags() {
        assert!(CursorDirection::Next.is_forward());
        assert!(CursorDirection::NextUnique.is_unique());
        assert!(!CursorDirection::Prev.is_forward());
        assert!(!CursorDirection::Prev.is_unique());
        assert_eq!(CursorDirection::default(), CursorDirection::Next);
    }
}
