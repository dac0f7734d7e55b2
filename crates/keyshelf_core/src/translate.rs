//! Turning engine failure events into messages.

use keyshelf_engine::{ErrorEvent, ReadyState};

/// Message reported for a request that has not finished, such as a blocked
/// open.
pub const OPERATION_PENDING: &str = "Error: Operation pending";

/// Returns a human-readable message for a failure event.
///
/// A pending request yields [`OPERATION_PENDING`]. Otherwise the vendor
/// message wins, then the error's own message, then the numeric code.
#[must_use]
pub fn error_message_for(event: &ErrorEvent) -> String {
    if event.ready_state == ReadyState::Pending {
        return OPERATION_PENDING.to_string();
    }
    if let Some(message) = &event.vendor_message {
        return message.clone();
    }
    if let Some(error) = &event.error {
        if !error.message.is_empty() {
            return error.message.clone();
        }
    }
    match event.error_code {
        Some(code) => code.to_string(),
        None => "Unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyshelf_engine::{DomError, ErrorName};

    fn done() -> ErrorEvent {
        ErrorEvent {
            ready_state: ReadyState::Done,
            error: None,
            vendor_message: None,
            error_code: None,
        }
    }

    #[test]
    fn pending_wins_over_everything() {
        let mut event = ErrorEvent::pending("blocked by 1 connection");
        event.error = Some(DomError::constraint("dup"));
        assert_eq!(error_message_for(&event), "Error: Operation pending");
    }

    #[test]
    fn vendor_message_then_error_message() {
        let mut event = ErrorEvent::failed(DomError::constraint("dup"));
        assert_eq!(error_message_for(&event), "dup");
        event.vendor_message = Some("vendor says no".to_string());
        assert_eq!(error_message_for(&event), "vendor says no");
    }

    #[test]
    fn falls_back_to_code() {
        let mut event = ErrorEvent::failed(DomError::new(ErrorName::AbortError, ""));
        assert_eq!(error_message_for(&event), "20");
        event.error = None;
        event.error_code = None;
        assert_eq!(error_message_for(&event), "Unknown error");
        assert_eq!(error_message_for(&done()), "Unknown error");
    }
}
