//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building keys, ranges or snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a snapshot to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A value could not be used as a key.
    #[error("{message}")]
    InvalidKey {
        /// Description of why the value is not a key.
        message: String,
    },

    /// The bounds of a key range are inconsistent.
    #[error("{message}")]
    InvalidRange {
        /// Description of the range problem.
        message: String,
    },

    /// A key path is malformed or cannot be applied to a value.
    #[error("{message}")]
    InvalidKeyPath {
        /// Description of the key path problem.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Create an invalid range error.
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create an invalid key path error.
    pub fn invalid_key_path(message: impl Into<String>) -> Self {
        Self::InvalidKeyPath {
            message: message.into(),
        }
    }
}
