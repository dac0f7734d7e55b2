//! Error types for the engine.

use keyshelf_codec::CodecError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for engine calls that fail synchronously.
pub type EngineResult<T> = Result<T, DomError>;

/// Result type for snapshot store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Names of the failures the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorName {
    /// A mutation violated a constraint (duplicate key, unique index).
    ConstraintError,
    /// A key, key range or record was not acceptable.
    DataError,
    /// A named object store or index does not exist.
    NotFoundError,
    /// A write was attempted in a read-only transaction.
    ReadOnlyError,
    /// The transaction has already finished or is aborting.
    TransactionInactiveError,
    /// The request was aborted together with its transaction.
    AbortError,
    /// A database was opened with a version lower than the stored one.
    VersionError,
    /// The call is not allowed in the object's current state.
    InvalidStateError,
    /// The call is not allowed with these arguments.
    InvalidAccessError,
    /// An argument has the wrong shape.
    TypeError,
    /// Anything else, mostly persistence failures.
    UnknownError,
}

impl ErrorName {
    /// Returns the name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorName::ConstraintError => "ConstraintError",
            ErrorName::DataError => "DataError",
            ErrorName::NotFoundError => "NotFoundError",
            ErrorName::ReadOnlyError => "ReadOnlyError",
            ErrorName::TransactionInactiveError => "TransactionInactiveError",
            ErrorName::AbortError => "AbortError",
            ErrorName::VersionError => "VersionError",
            ErrorName::InvalidStateError => "InvalidStateError",
            ErrorName::InvalidAccessError => "InvalidAccessError",
            ErrorName::TypeError => "TypeError",
            ErrorName::UnknownError => "UnknownError",
        }
    }

    /// Returns the legacy numeric code for this name, or 0 when the name
    /// never had one.
    #[must_use]
    pub const fn legacy_code(self) -> u16 {
        match self {
            ErrorName::NotFoundError => 8,
            ErrorName::InvalidStateError => 11,
            ErrorName::InvalidAccessError => 15,
            ErrorName::AbortError => 20,
            ErrorName::DataError
            | ErrorName::ConstraintError
            | ErrorName::ReadOnlyError
            | ErrorName::TransactionInactiveError
            | ErrorName::VersionError
            | ErrorName::TypeError
            | ErrorName::UnknownError => 0,
        }
    }
}

impl fmt::Display for ErrorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named engine failure.
///
/// Returned synchronously when a call is misused, and carried inside
/// [`crate::ErrorEvent`]s when a request fails asynchronously.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct DomError {
    /// The failure name.
    pub name: ErrorName,
    /// Human-readable message.
    pub message: String,
}

impl DomError {
    /// Creates an error with the given name and message.
    pub fn new(name: ErrorName, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }

    /// Returns the legacy numeric code.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.name.legacy_code()
    }

    /// Create a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorName::ConstraintError, message)
    }

    /// Create a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorName::DataError, message)
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorName::NotFoundError, message)
    }

    /// Create a read-only error.
    pub fn read_only() -> Self {
        Self::new(
            ErrorName::ReadOnlyError,
            "The transaction is read-only.",
        )
    }

    /// Create a transaction inactive error.
    pub fn inactive() -> Self {
        Self::new(
            ErrorName::TransactionInactiveError,
            "The transaction has finished.",
        )
    }

    /// Create an abort error.
    pub fn aborted() -> Self {
        Self::new(ErrorName::AbortError, "The transaction was aborted.")
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorName::InvalidStateError, message)
    }

    /// Create an invalid access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::new(ErrorName::InvalidAccessError, message)
    }

    /// Create an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorName::UnknownError, message)
    }
}

impl From<CodecError> for DomError {
    fn from(err: CodecError) -> Self {
        DomError::data(err.to_string())
    }
}

impl From<StorageError> for DomError {
    fn from(err: StorageError) -> Self {
        DomError::unknown(err.to_string())
    }
}

/// Errors raised by snapshot stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] CodecError),

    /// Another process holds the directory lock.
    #[error("snapshot directory is locked by another process")]
    Locked,

    /// The database name cannot be mapped to a snapshot.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_name_and_message() {
        let err = DomError::constraint("Key already exists in the object store.");
        assert_eq!(
            err.to_string(),
            "ConstraintError: Key already exists in the object store."
        );
    }

    #[test]
    fn legacy_codes() {
        assert_eq!(DomError::aborted().code(), 20);
        assert_eq!(DomError::not_found("x").code(), 8);
        assert_eq!(DomError::constraint("x").code(), 0);
    }

    #[test]
    fn codec_errors_become_data_errors() {
        let err: DomError = CodecError::invalid_range("bad").into();
        assert_eq!(err.name, ErrorName::DataError);
        assert_eq!(err.message, "bad");
    }
}
