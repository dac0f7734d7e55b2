//! Error types for KeyShelf core.

use keyshelf_codec::CodecError;
use keyshelf_engine::DomError;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// How a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFailure {
    /// A request failed and the engine aborted the transaction.
    Error,
    /// The transaction was aborted without a failing request.
    Aborted,
}

impl fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionFailure::Error => "Transaction Error",
            TransactionFailure::Aborted => "Transaction Aborted",
        })
    }
}

/// Errors surfaced by the data-access layer.
///
/// Every failure reaches the caller as a rejected future carrying one of
/// these. Nothing is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Opening, upgrading or deleting the database failed.
    #[error("{message}")]
    Connection {
        /// Translated failure message.
        message: String,
    },

    /// Stores requested for a transaction do not exist.
    #[error("Object stores {} do not exist.", .names.join(","))]
    StoreNotFound {
        /// Every requested store name, in request order.
        names: Vec<String>,
    },

    /// A single engine request failed or was blocked.
    #[error("{message}")]
    Request {
        /// Translated failure message.
        message: String,
    },

    /// The transaction did not commit.
    #[error("{failure}")]
    Transaction {
        /// Whether a request failed or the transaction was aborted.
        failure: TransactionFailure,
        /// Translated message of the underlying failure.
        reason: String,
    },

    /// `find` found no record under the key.
    #[error("{store}:{key} not found.")]
    NotFound {
        /// Store that was searched.
        store: String,
        /// Display form of the key.
        key: String,
    },

    /// An upgrade step was rejected at registration or failed to run.
    #[error("migration failed: {message}")]
    Migration {
        /// Description of the failure.
        message: String,
    },

    /// A record could not be converted to or from a typed value.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The operation was dropped before it produced a result.
    #[error("the operation was abandoned before it settled")]
    Abandoned,
}

impl CoreError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a store-not-found error listing `names`.
    pub fn store_not_found<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StoreNotFound {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a request error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(failure: TransactionFailure, reason: impl Into<String>) -> Self {
        Self::Transaction {
            failure,
            reason: reason.into(),
        }
    }

    /// Creates a not-found error for `key` in `store`.
    pub fn not_found(store: impl Into<String>, key: impl fmt::Display) -> Self {
        Self::NotFound {
            store: store.into(),
            key: key.to_string(),
        }
    }

    /// Creates a migration error.
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Reclassifies a request failure as a connection failure.
    #[must_use]
    pub(crate) fn into_connection(self) -> Self {
        match self {
            Self::Request { message } => Self::Connection { message },
            other => other,
        }
    }
}

impl From<DomError> for CoreError {
    fn from(err: DomError) -> Self {
        Self::request(err.message)
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        Self::request(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyshelf_engine::ErrorName;

    #[test]
    fn store_not_found_lists_every_name() {
        let err = CoreError::store_not_found(["A", "B"]);
        assert_eq!(err.to_string(), "Object stores A,B do not exist.");
    }

    #[test]
    fn transaction_failures_use_fixed_markers() {
        let error = CoreError::transaction(TransactionFailure::Error, "dup");
        let aborted = CoreError::transaction(TransactionFailure::Aborted, "gone");
        assert_eq!(error.to_string(), "Transaction Error");
        assert_eq!(aborted.to_string(), "Transaction Aborted");
    }

    #[test]
    fn not_found_names_store_and_key() {
        let err = CoreError::not_found("TestObjects", keyshelf_codec::Key::from(42));
        assert_eq!(err.to_string(), "TestObjects:42 not found.");
    }

    #[test]
    fn engine_errors_keep_their_message() {
        let err: CoreError = DomError::new(ErrorName::ConstraintError, "taken").into();
        assert_eq!(err, CoreError::request("taken"));
        assert_eq!(
            err.into_connection(),
            CoreError::connection("taken")
        );
    }

    #[test]
    fn codec_range_errors_carry_the_codec_message() {
        let err: CoreError = CodecError::invalid_range("bad range").into();
        assert_eq!(err.to_string(), "bad range");
    }
}
