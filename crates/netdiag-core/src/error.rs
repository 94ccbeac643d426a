//! Error types for the network diagnosis core
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for network diagnosis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the network diagnosis system
#[derive(Error, Debug)]
pub enum Error {
    /// The probe engine is not available on this platform
    #[error("platform not supported")]
    UnsupportedPlatform,

    /// A raw result failed structural validation
    #[error("Decode error: {0}")]
    Decode(DecodeError),

    /// The engine embedded an explicit error indicator in its payload
    #[error("{0}")]
    EngineSignaled(String),

    /// Operation inconsistent with the session state machine
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid caller input (host, counts, ports)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine rejected or failed a command
    #[error("Engine error ({engine}): {message}")]
    Engine {
        /// Engine name
        engine: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an engine error
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::EngineSignaled(message) => Self::EngineSignaled(message),
            other => Self::Decode(other),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Structural decoding failure for a single raw record
///
/// Unlike [`Error`], this type is `Clone` so it can be delivered to every
/// subscriber of a stream as part of a [`crate::ProbeEvent`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The payload could not be parsed at all
    #[error("malformed {what}: {reason}")]
    Malformed {
        /// What was being decoded (event or query name)
        what: String,
        /// Parser message
        reason: String,
    },

    /// A required field is absent
    #[error("missing field `{field}` in {what}")]
    MissingField {
        /// What was being decoded
        what: String,
        /// Name of the absent field
        field: String,
    },

    /// A numeric field lies outside its permitted range
    #[error("field `{field}` out of range: {value}")]
    OutOfRange {
        /// Field name
        field: String,
        /// Offending value, rendered
        value: String,
    },

    /// The payload carried the reserved error field
    #[error("{0}")]
    EngineSignaled(String),
}

impl DecodeError {
    pub(crate) fn malformed(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing(what: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            what: what.into(),
            field: field.into(),
        }
    }

    pub(crate) fn out_of_range(field: impl Into<String>, value: impl ToString) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_signaled_decode_error_becomes_engine_failure() {
        let err: Error = DecodeError::EngineSignaled("resolution failed".into()).into();
        assert!(matches!(err, Error::EngineSignaled(_)));
        assert_eq!(err.to_string(), "resolution failed");
    }

    #[test]
    fn anyhow_errors_keep_their_message() {
        let err: Error = anyhow::anyhow!("bridge closed").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "bridge closed");
    }

    #[test]
    fn unsupported_platform_message() {
        assert_eq!(Error::UnsupportedPlatform.to_string(), "platform not supported");
    }
}
