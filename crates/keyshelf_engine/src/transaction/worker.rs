//! The per-transaction worker task.

use super::operation::{Context, Operation, UndoLog};
use super::{Message, Outcome, Phase, TransactionMode, TxnShared};
use crate::error::DomError;
use crate::event::ErrorEvent;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{trace, warn};

enum Failure {
    Request(DomError),
    Explicit,
}

/// Runs queued operations in order until every handle to the transaction
/// is gone (commit) or something fails (abort).
pub(super) async fn run(
    shared: Arc<TxnShared>,
    mut receiver: UnboundedReceiver<Message>,
    mut undo: UndoLog,
) {
    if !shared.cell().scheduler.may_start(shared.id) {
        trace!(transaction = shared.id, "waiting for overlapping transactions");
    }
    shared.cell().scheduler.wait_turn(shared.id).await;

    let mut failure = None;
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Abort => {
                failure = Some(Failure::Explicit);
                break;
            }
            Message::Run(operation) => {
                if shared.phase() != Phase::Active {
                    operation.fail(DomError::aborted());
                    continue;
                }
                if let Err(error) = execute(&shared, operation, &mut undo) {
                    failure = Some(Failure::Request(error));
                    break;
                }
            }
        }
    }

    match failure {
        None => commit(&shared, &mut undo),
        Some(failure) => abort(&shared, &mut receiver, &mut undo, failure),
    }
}

fn execute(
    shared: &TxnShared,
    mut operation: Box<dyn Operation>,
    undo: &mut UndoLog,
) -> Result<(), DomError> {
    let result = {
        let mut state = shared.cell().state.lock();
        operation.perform(&mut Context::new(&mut state, undo))
    };
    match result {
        Ok(()) => {
            operation.deliver();
            Ok(())
        }
        Err(error) => {
            operation.fail(error.clone());
            Err(error)
        }
    }
}

fn has_writes(shared: &TxnShared, undo: &UndoLog) -> bool {
    match shared.mode {
        TransactionMode::VersionChange => true,
        TransactionMode::ReadWrite => undo.is_dirty(),
        TransactionMode::ReadOnly => false,
    }
}

fn commit(shared: &TxnShared, undo: &mut UndoLog) {
    if has_writes(shared, undo) {
        if let Err(err) = shared.cell().commit(shared.written_scope()) {
            warn!(transaction = shared.id, error = %err, "failed to persist transaction");
            let error = DomError::unknown(format!("Failed to persist the transaction: {err}"));
            undo.rollback(&mut shared.cell().state.lock());
            shared.finish(Outcome::Aborted(error.clone()));
            shared.abort.fire(ErrorEvent::failed(error));
            return;
        }
    }
    trace!(transaction = shared.id, mode = ?shared.mode, "transaction committed");
    shared.finish(Outcome::Committed);
    shared.complete.fire(());
}

fn abort(
    shared: &TxnShared,
    receiver: &mut UnboundedReceiver<Message>,
    undo: &mut UndoLog,
    failure: Failure,
) {
    shared.set_phase(Phase::Aborting);
    receiver.close();

    let error = match failure {
        Failure::Request(error) => {
            shared.error.fire(ErrorEvent::failed(error.clone()));
            error
        }
        Failure::Explicit => DomError::aborted(),
    };

    undo.rollback(&mut shared.cell().state.lock());

    while let Ok(message) = receiver.try_recv() {
        if let Message::Run(operation) = message {
            operation.fail(DomError::aborted());
        }
    }

    warn!(transaction = shared.id, error = %error, "transaction aborted");
    shared.finish(Outcome::Aborted(error.clone()));
    shared.abort.fire(ErrorEvent::failed(error));
}
