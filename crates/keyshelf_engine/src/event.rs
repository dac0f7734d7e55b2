//! Event payloads and handler slots.

use crate::error::DomError;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Whether a request has produced its result yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The request has not finished.
    Pending,
    /// The request has finished, successfully or not.
    Done,
}

/// Payload of an error, blocked or abort event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Ready state of the request when the event fired.
    pub ready_state: ReadyState,
    /// The failure, if one is attached.
    pub error: Option<DomError>,
    /// Free-form detail some events carry instead of (or as well as) an
    /// error.
    pub vendor_message: Option<String>,
    /// Legacy numeric code, when the failure has one.
    pub error_code: Option<u16>,
}

impl ErrorEvent {
    /// An event for a finished request that failed with `error`.
    #[must_use]
    pub fn failed(error: DomError) -> Self {
        let code = error.code();
        Self {
            ready_state: ReadyState::Done,
            error: Some(error),
            vendor_message: None,
            error_code: (code != 0).then_some(code),
        }
    }

    /// An event for a request that is still waiting, such as an open
    /// blocked by other connections.
    #[must_use]
    pub fn pending(detail: impl Into<String>) -> Self {
        Self {
            ready_state: ReadyState::Pending,
            error: None,
            vendor_message: Some(detail.into()),
            error_code: None,
        }
    }
}

type Handler<E> = Box<dyn FnMut(E) + Send>;

struct SlotState<E> {
    handler: Option<Handler<E>>,
    backlog: VecDeque<E>,
    firing: bool,
}

/// Holds the handler for one kind of event.
///
/// Events fired before a handler is installed are buffered and delivered,
/// in order, once it is. Handlers run without the slot lock held, so a
/// handler may fire further events on the same slot; those are queued and
/// delivered after it returns.
pub(crate) struct EventSlot<E> {
    state: Mutex<SlotState<E>>,
}

impl<E> Default for EventSlot<E> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                handler: None,
                backlog: VecDeque::new(),
                firing: false,
            }),
        }
    }
}

impl<E> EventSlot<E> {
    /// Installs (or replaces) the handler and delivers any buffered events.
    pub(crate) fn set(&self, handler: Handler<E>) {
        let mut state = self.state.lock();
        state.handler = Some(handler);
        if state.firing || state.backlog.is_empty() {
            return;
        }
        drop(state);
        self.drain();
    }

    /// Fires an event, buffering it if no handler is installed.
    pub(crate) fn fire(&self, event: E) {
        let mut state = self.state.lock();
        state.backlog.push_back(event);
        if state.firing || state.handler.is_none() {
            return;
        }
        drop(state);
        self.drain();
    }

    fn drain(&self) {
        let mut state = self.state.lock();
        let Some(mut handler) = state.handler.take() else {
            return;
        };
        state.firing = true;
        loop {
            let Some(event) = state.backlog.pop_front() else {
                break;
            };
            drop(state);
            handler(event);
            state = self.state.lock();
            // A handler installed while firing replaces the running one.
            if let Some(replacement) = state.handler.take() {
                handler = replacement;
            }
        }
        state.handler = Some(handler);
        state.firing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn buffers_until_handler_installed() {
        let slot = EventSlot::<u32>::default();
        slot.fire(1);
        slot.fire(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        slot.set(Box::new(move |n| sink.lock().push(n)));
        slot.fire(3);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn handler_may_fire_reentrantly() {
        let slot = Arc::new(EventSlot::<u32>::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, inner) = (seen.clone(), Arc::downgrade(&slot));
        slot.set(Box::new(move |n| {
            sink.lock().push(n);
            if n < 3 {
                if let Some(slot) = inner.upgrade() {
                    slot.fire(n + 1);
                }
            }
        }));
        slot.fire(1);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn failed_event_carries_code() {
        let event = ErrorEvent::failed(DomError::aborted());
        assert_eq!(event.ready_state, ReadyState::Done);
        assert_eq!(event.error_code, Some(20));
        assert_eq!(ErrorEvent::failed(DomError::data("x")).error_code, None);
    }
}
