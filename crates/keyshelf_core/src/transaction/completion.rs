//! Transaction completion futures.

use crate::error::{CoreError, TransactionFailure};
use crate::translate::error_message_for;
use keyshelf_engine::Transaction as NativeTransaction;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Message a completed transaction resolves with.
pub const TRANSACTION_COMPLETED: &str = "Transaction Completed";

/// How a transaction settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The transaction committed.
    Completed,
    /// The transaction failed or was aborted.
    Failed(CoreError),
}

impl TransactionOutcome {
    /// Returns true if the transaction committed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, TransactionOutcome::Completed)
    }

    /// Converts the outcome into a result carrying the completion message.
    ///
    /// # Errors
    ///
    /// Returns the failure of a transaction that did not commit.
    pub fn into_result(self) -> Result<&'static str, CoreError> {
        match self {
            TransactionOutcome::Completed => Ok(TRANSACTION_COMPLETED),
            TransactionOutcome::Failed(error) => Err(error),
        }
    }
}

/// The completion future of one transaction.
///
/// Clones observe the same transaction; every collection opened in the
/// transaction shares it. The first of complete, error or abort decides
/// the outcome.
#[derive(Clone)]
pub struct Completion {
    receiver: watch::Receiver<Option<TransactionOutcome>>,
}

impl Completion {
    pub(crate) fn attach(transaction: &NativeTransaction) -> Self {
        let (sender, receiver) = watch::channel(None);
        let sender = Arc::new(sender);

        let settle = |sender: Arc<watch::Sender<Option<TransactionOutcome>>>| {
            move |outcome: TransactionOutcome| {
                sender.send_if_modified(|slot| {
                    if slot.is_some() {
                        return false;
                    }
                    *slot = Some(outcome);
                    true
                });
            }
        };

        let complete = settle(Arc::clone(&sender));
        transaction.on_complete(move |()| complete(TransactionOutcome::Completed));

        let error = settle(Arc::clone(&sender));
        transaction.on_error(move |event| {
            error(TransactionOutcome::Failed(CoreError::transaction(
                TransactionFailure::Error,
                error_message_for(&event),
            )));
        });

        let abort = settle(sender);
        transaction.on_abort(move |event| {
            abort(TransactionOutcome::Failed(CoreError::transaction(
                TransactionFailure::Aborted,
                error_message_for(&event),
            )));
        });

        Self { receiver }
    }

    /// Returns the outcome if the transaction has settled.
    #[must_use]
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        self.receiver.borrow().clone()
    }

    /// Waits for the transaction to settle.
    pub async fn wait(&self) -> TransactionOutcome {
        let mut receiver = self.receiver.clone();
        let settled = receiver
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        match settled {
            Ok(Some(outcome)) => outcome,
            Ok(None) | Err(_) => TransactionOutcome::Failed(CoreError::Abandoned),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.outcome())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_converts_to_completion_marker() {
        assert_eq!(
            TransactionOutcome::Completed.into_result(),
            Ok("Transaction Completed")
        );
        let failed = TransactionOutcome::Failed(CoreError::transaction(
            TransactionFailure::Error,
            "dup",
        ));
        assert!(!failed.is_completed());
        assert_eq!(
            failed.into_result().unwrap_err().to_string(),
            "Transaction Error"
        );
    }
}
