//! Requests: the handles through which asynchronous results arrive.

use crate::connection::Connection;
use crate::error::DomError;
use crate::event::{ErrorEvent, EventSlot, ReadyState};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

struct RequestInner<T> {
    ready_state: Mutex<ReadyState>,
    success: EventSlot<T>,
    error: EventSlot<ErrorEvent>,
    blocked: EventSlot<ErrorEvent>,
}

/// A pending engine request.
///
/// Exactly one of the success or error handlers runs for an ordinary
/// request. Cursor requests run the success handler once per step.
/// Handlers may be installed after the request was issued; results that
/// arrived in the meantime are delivered on installation.
pub struct Request<T> {
    inner: Arc<RequestInner<T>>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Request<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RequestInner {
                ready_state: Mutex::new(ReadyState::Pending),
                success: EventSlot::default(),
                error: EventSlot::default(),
                blocked: EventSlot::default(),
            }),
        }
    }

    /// Installs the success handler.
    pub fn on_success(&self, handler: impl FnMut(T) + Send + 'static) {
        self.inner.success.set(Box::new(handler));
    }

    /// Installs the error handler.
    pub fn on_error(&self, handler: impl FnMut(ErrorEvent) + Send + 'static) {
        self.inner.error.set(Box::new(handler));
    }

    /// Installs the blocked handler.
    ///
    /// Only open and delete requests fire it: when other connections keep
    /// the database open, the request waits and reports that it is blocked.
    pub fn on_blocked(&self, handler: impl FnMut(ErrorEvent) + Send + 'static) {
        self.inner.blocked.set(Box::new(handler));
    }

    /// Returns the current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready_state.lock()
    }

    pub(crate) fn succeed(&self, value: T) {
        *self.inner.ready_state.lock() = ReadyState::Done;
        self.inner.success.fire(value);
    }

    pub(crate) fn fail(&self, error: DomError) {
        *self.inner.ready_state.lock() = ReadyState::Done;
        self.inner.error.fire(ErrorEvent::failed(error));
    }

    pub(crate) fn block(&self, detail: impl Into<String>) {
        self.inner.blocked.fire(ErrorEvent::pending(detail));
    }
}

/// Payload of the upgrade-needed event.
///
/// Holding the event keeps the upgrade transaction alive.
#[derive(Debug, Clone)]
pub struct UpgradeEvent {
    /// Version stored before the open, 0 for a new database.
    pub old_version: u64,
    /// Version being opened.
    pub new_version: u64,
    /// The connection being opened.
    pub connection: Connection,
    /// The version-change transaction schema changes must run in.
    pub transaction: Transaction,
}

/// Request returned by [`crate::Factory::open`].
///
/// Besides the usual handlers it fires an upgrade-needed event when the
/// requested version is higher than the stored one.
#[derive(Clone)]
pub struct OpenRequest {
    request: Request<Connection>,
    upgrade: Arc<EventSlot<UpgradeEvent>>,
}

impl OpenRequest {
    pub(crate) fn new() -> Self {
        Self {
            request: Request::new(),
            upgrade: Arc::new(EventSlot::default()),
        }
    }

    /// Installs the upgrade-needed handler.
    ///
    /// The handler runs before the open succeeds. Schema changes made
    /// through the event's transaction commit (or roll back) as one unit.
    pub fn on_upgrade_needed(&self, handler: impl FnMut(UpgradeEvent) + Send + 'static) {
        self.upgrade.set(Box::new(handler));
    }

    pub(crate) fn upgrade_needed(&self, event: UpgradeEvent) {
        self.upgrade.fire(event);
    }
}

impl Deref for OpenRequest {
    type Target = Request<Connection>;

    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest")
            .field("ready_state", &self.request.ready_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorName;

    #[test]
    fn success_before_handler_is_delivered() {
        let request = Request::<u32>::new();
        request.succeed(7);
        assert_eq!(request.ready_state(), ReadyState::Done);
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        request.on_success(move |v| *sink.lock() = Some(v));
        assert_eq!(*seen.lock(), Some(7));
    }

    #[test]
    fn error_event_carries_dom_error() {
        let request = Request::<()>::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        request.on_error(move |e| *sink.lock() = e.error);
        request.fail(DomError::constraint("dup"));
        assert_eq!(
            seen.lock().as_ref().map(|e| e.name),
            Some(ErrorName::ConstraintError)
        );
    }

    #[test]
    fn blocked_keeps_request_pending() {
        let request = Request::<()>::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        request.on_blocked(move |e| *sink.lock() = Some(e.ready_state));
        request.block("open connections");
        assert_eq!(*seen.lock(), Some(ReadyState::Pending));
        assert_eq!(request.ready_state(), ReadyState::Pending);
    }
}
