//! Transactions as seen by callers of the data-access layer.
//!
//! A [`Transaction`] wraps one native transaction together with its
//! [`Completion`]. It is consumed into one [`Collection`] per requested
//! store; from then on the collections are the only handles keeping the
//! native transaction open, and it commits once they are all dropped and
//! their requests have finished.

mod completion;
pub(crate) mod manager;

pub use completion::{Completion, TransactionOutcome, TRANSACTION_COMPLETED};

use crate::collection::Collection;
use crate::error::CoreResult;
use keyshelf_engine::Transaction as NativeTransaction;
use std::fmt;

/// An open transaction over a fixed list of stores.
pub struct Transaction {
    native: NativeTransaction,
    names: Vec<String>,
    completion: Completion,
}

impl Transaction {
    pub(crate) fn new(
        native: NativeTransaction,
        names: Vec<String>,
        completion: Completion,
    ) -> Self {
        Self {
            native,
            names,
            completion,
        }
    }

    /// Returns the completion future.
    #[must_use]
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Returns the requested store names, in request order.
    #[must_use]
    pub fn store_names(&self) -> &[String] {
        &self.names
    }

    /// Builds one collection per requested store, in request order, and
    /// releases this handle.
    ///
    /// # Errors
    ///
    /// Fails if a store handle cannot be obtained from the engine.
    pub fn into_collections(self) -> CoreResult<Vec<Collection>> {
        let Transaction {
            native,
            names,
            completion,
        } = self;
        names
            .iter()
            .map(|name| -> CoreResult<Collection> {
                let store = native.object_store(name)?;
                Ok(Collection::new(store, completion.clone()))
            })
            .collect()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("stores", &self.names)
            .field("native", &self.native)
            .field("completion", &self.completion)
            .finish()
    }
}
