//! Opening transactions and tracking the ones still in flight.

use super::completion::{Completion, TransactionOutcome};
use super::Transaction;
use crate::config::AccessMode;
use crate::error::{CoreError, CoreResult};
use keyshelf_engine::Connection;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Completion futures of every transaction that has not settled yet.
///
/// Entries are added when a transaction is opened and removed when it
/// settles, in whatever order that happens.
#[derive(Debug, Default)]
pub(crate) struct PendingTransactions {
    next_id: Mutex<u64>,
    entries: Mutex<BTreeMap<u64, Completion>>,
}

impl PendingTransactions {
    pub(crate) fn track(self: &Arc<Self>, completion: &Completion) {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.entries.lock().insert(id, completion.clone());

        let pending: Weak<Self> = Arc::downgrade(self);
        let watched = completion.clone();
        tokio::spawn(async move {
            watched.wait().await;
            if let Some(pending) = pending.upgrade() {
                pending.entries.lock().remove(&id);
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Waits for every transaction pending right now, in the order they
    /// were opened.
    pub(crate) async fn settle_all(&self) -> Vec<TransactionOutcome> {
        let pending: Vec<Completion> = self.entries.lock().values().cloned().collect();
        let mut outcomes = Vec::with_capacity(pending.len());
        for completion in pending {
            outcomes.push(completion.wait().await);
        }
        outcomes
    }
}

/// Opens a transaction over `names` after checking that every store
/// exists, and registers it with `pending`.
///
/// Nothing is created when a store is missing.
pub(crate) fn begin(
    connection: &Connection,
    names: &[String],
    mode: AccessMode,
    pending: &Arc<PendingTransactions>,
) -> CoreResult<Transaction> {
    let known = connection.object_store_names();
    if names.is_empty() || names.iter().any(|name| !known.contains(name)) {
        return Err(CoreError::store_not_found(names.iter().cloned()));
    }
    let native = connection.transaction(names, mode.into())?;
    let completion = Completion::attach(&native);
    pending.track(&completion);
    trace!(database = connection.name(), stores = ?names, mode = ?mode, "transaction opened");
    Ok(Transaction::new(native, names.to_vec(), completion))
}
