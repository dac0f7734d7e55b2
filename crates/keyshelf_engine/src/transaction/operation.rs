//! Queued operations and the undo log they write to.

use crate::error::{DomError, EngineResult};
use crate::request::Request;
use crate::state::{DatabaseState, StoreState};
use keyshelf_codec::Key;
use serde_json::Value;

/// One request's worth of work, run by the transaction worker.
///
/// `perform` runs with the database lock held and must not call back into
/// user code; `deliver` and `fail` run after the lock is released and fire
/// the request's handlers.
pub(crate) trait Operation: Send {
    fn perform(&mut self, ctx: &mut Context<'_>) -> EngineResult<()>;
    fn deliver(self: Box<Self>);
    fn fail(self: Box<Self>, error: DomError);
}

/// An operation built from a closure whose result is the request result.
pub(crate) struct Job<T, F> {
    request: Request<T>,
    work: Option<F>,
    result: Option<T>,
}

impl<T, F> Job<T, F>
where
    T: Send + 'static,
    F: FnOnce(&mut Context<'_>) -> EngineResult<T> + Send + 'static,
{
    pub(crate) fn new(request: Request<T>, work: F) -> Box<Self> {
        Box::new(Self {
            request,
            work: Some(work),
            result: None,
        })
    }
}

impl<T, F> Operation for Job<T, F>
where
    T: Send + 'static,
    F: FnOnce(&mut Context<'_>) -> EngineResult<T> + Send + 'static,
{
    fn perform(&mut self, ctx: &mut Context<'_>) -> EngineResult<()> {
        if let Some(work) = self.work.take() {
            self.result = Some(work(ctx)?);
        }
        Ok(())
    }

    fn deliver(self: Box<Self>) {
        let Job {
            request, result, ..
        } = *self;
        if let Some(result) = result {
            request.succeed(result);
        }
    }

    fn fail(self: Box<Self>, error: DomError) {
        self.request.fail(error);
    }
}

/// What an operation sees while it runs.
pub(crate) struct Context<'a> {
    state: &'a mut DatabaseState,
    undo: &'a mut UndoLog,
}

impl<'a> Context<'a> {
    pub(crate) fn new(state: &'a mut DatabaseState, undo: &'a mut UndoLog) -> Self {
        Self { state, undo }
    }

    pub(crate) fn state(&self) -> &DatabaseState {
        self.state
    }

    /// Stores a record, generating its key if needed, and returns the key.
    pub(crate) fn put(
        &mut self,
        store: &str,
        mut value: Value,
        key: Option<Key>,
        no_overwrite: bool,
    ) -> EngineResult<Key> {
        let target = self.state.store_mut(store)?;
        let generator = target.generator();
        let key = match target.resolve_key(&mut value, key) {
            Ok(key) => key,
            Err(err) => {
                target.set_generator(generator);
                return Err(err);
            }
        };
        match target.put(key.clone(), value, no_overwrite) {
            Ok(previous) => {
                if target.generator() != generator {
                    self.undo.record(Undo::Generator {
                        store: store.to_string(),
                        next_key: generator,
                    });
                }
                self.undo.record(Undo::Record {
                    store: store.to_string(),
                    key: key.clone(),
                    previous,
                });
                Ok(key)
            }
            Err(err) => {
                target.set_generator(generator);
                Err(err)
            }
        }
    }

    pub(crate) fn delete(&mut self, store: &str, key: &Key) -> EngineResult<()> {
        let previous = self.state.store_mut(store)?.remove(key);
        if previous.is_some() {
            self.undo.record(Undo::Record {
                store: store.to_string(),
                key: key.clone(),
                previous,
            });
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self, store: &str) -> EngineResult<()> {
        let target = self.state.store_mut(store)?;
        if self.undo.tracks_entries() {
            self.undo.record(Undo::Store {
                store: store.to_string(),
                previous: target.clone(),
            });
        } else {
            self.undo.mark_dirty();
        }
        target.clear();
        Ok(())
    }
}

enum Undo {
    Record {
        store: String,
        key: Key,
        previous: Option<Value>,
    },
    Generator {
        store: String,
        next_key: u64,
    },
    Store {
        store: String,
        previous: StoreState,
    },
}

/// How to put the database back if the transaction aborts.
///
/// Version-change transactions keep a full snapshot taken before the
/// upgrade; other transactions keep a log of the records they replaced.
pub(crate) struct UndoLog {
    snapshot: Option<DatabaseState>,
    entries: Vec<Undo>,
    dirty: bool,
}

impl UndoLog {
    pub(crate) fn new(snapshot: Option<DatabaseState>) -> Self {
        Self {
            snapshot,
            entries: Vec::new(),
            dirty: false,
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn tracks_entries(&self) -> bool {
        self.snapshot.is_none()
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn record(&mut self, undo: Undo) {
        self.dirty = true;
        if self.tracks_entries() {
            self.entries.push(undo);
        }
    }

    /// Undoes everything recorded, newest first.
    pub(crate) fn rollback(&mut self, state: &mut DatabaseState) {
        if let Some(snapshot) = self.snapshot.take() {
            *state = snapshot;
            return;
        }
        while let Some(undo) = self.entries.pop() {
            match undo {
                Undo::Record {
                    store,
                    key,
                    previous,
                } => {
                    if let Ok(target) = state.store_mut(&store) {
                        target.restore(&key, previous);
                    }
                }
                Undo::Generator { store, next_key } => {
                    if let Ok(target) = state.store_mut(&store) {
                        target.set_generator(next_key);
                    }
                }
                Undo::Store { store, previous } => {
                    state.stores.insert(store, previous);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyshelf_codec::KeyPath;
    use serde_json::json;

    fn state() -> DatabaseState {
        let mut state = DatabaseState::default();
        state.version = 1;
        state
            .stores
            .insert("items".into(), StoreState::new(Some(KeyPath::from("id")), true));
        state
    }

    #[test]
    fn rollback_restores_records_and_generator() {
        let mut db = state();
        let mut seed = UndoLog::new(None);
        Context::new(&mut db, &mut seed)
            .put("items", json!({"id": 1, "v": "keep"}), None, true)
            .unwrap();

        let mut undo = UndoLog::new(None);
        {
            let mut ctx = Context::new(&mut db, &mut undo);
            ctx.put("items", json!({"id": 1, "v": "changed"}), None, false).unwrap();
            ctx.put("items", json!({"v": "generated"}), None, true).unwrap();
            ctx.clear("items").unwrap();
        }
        assert!(undo.is_dirty());
        undo.rollback(&mut db);

        let items = db.store("items").unwrap();
        assert_eq!(items.count(None), 1);
        assert_eq!(items.get(&Key::from(1)), Some(&json!({"id": 1, "v": "keep"})));
        assert_eq!(items.generator(), 2);
    }

    #[test]
    fn failed_put_leaves_generator_alone() {
        let mut db = state();
        let mut undo = UndoLog::new(None);
        let mut ctx = Context::new(&mut db, &mut undo);
        ctx.put("items", json!({"id": 5}), None, true).unwrap();
        assert!(ctx.put("items", json!({"id": 5}), None, true).is_err());
        assert_eq!(db.store("items").unwrap().generator(), 6);
    }

    #[test]
    fn snapshot_rollback_replaces_everything() {
        let mut db = state();
        let mut undo = UndoLog::new(Some(DatabaseState::default()));
        Context::new(&mut db, &mut undo)
            .put("items", json!({}), None, true)
            .unwrap();
        undo.rollback(&mut db);
        assert_eq!(db.version, 0);
        assert!(db.stores.is_empty());
    }
}
