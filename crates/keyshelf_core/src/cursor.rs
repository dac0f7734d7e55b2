//! Cursor-driven iteration with progress notifications.

use crate::deferred::{Deferred, Promise};
use crate::error::CoreError;
use keyshelf_engine::{Cursor, EngineResult, Request};

/// Walks a cursor to exhaustion.
///
/// Each visited entry is mapped, notified and collected; the promise
/// resolves with every mapped entry in visitation order. A failing or
/// blocked step rejects the promise and ends the walk.
pub(crate) fn iterate<P, M>(
    opened: EngineResult<Request<Option<Cursor>>>,
    map: M,
) -> Promise<Vec<P>, P>
where
    P: Clone + Send + 'static,
    M: Fn(&Cursor) -> P + Send + 'static,
{
    let request = match opened {
        Ok(request) => request,
        Err(error) => return Promise::rejected(error.into()),
    };
    let (deferred, promise) = Deferred::new();
    deferred.reject_with(&request);

    let mut results = Vec::new();
    request.on_success(move |step: Option<Cursor>| match step {
        Some(cursor) => {
            let item = map(&cursor);
            results.push(item.clone());
            deferred.notify(item);
            if let Err(error) = cursor.continue_() {
                deferred.reject(CoreError::from(error));
            }
        }
        None => deferred.resolve(std::mem::take(&mut results)),
    });
    promise
}
