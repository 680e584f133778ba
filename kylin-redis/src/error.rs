//! # Error Types
//!
//! Every failure surfaced by the holder or the typed accessors is a
//! `CacheError`. The variants keep "missing key", "corrupt value" and
//! "server unreachable" apart so callers can react to each.

use thiserror::Error;

/// Result type used across the crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the connection holder and typed accessors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No usable connection: connect failed, or the socket broke mid-command.
    #[error("connection error: {0}")]
    Connection(#[source] redis::RedisError),

    /// Key (or hash field, or list element) is absent.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Stored text is not valid JSON or does not match the requested type.
    #[error("failed to deserialize value at {key}: {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded as JSON.
    #[error("failed to serialize value: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Invalid configuration string or invalid required argument.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Server replied with an error (e.g. WRONGTYPE).
    #[error("command failed: {0}")]
    Command(#[source] redis::RedisError),
}

impl CacheError {
    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        CacheError::NotFound { key: key.into() }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        CacheError::Argument(message.into())
    }

    /// Returns true for the not-found signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }

    /// Returns true when the error means the handle is unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, CacheError::Connection(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if breaks_connection(&err) {
            CacheError::Connection(err)
        } else {
            CacheError::Command(err)
        }
    }
}

/// Whether a client error leaves the underlying socket unusable.
pub(crate) fn breaks_connection(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_errors_classify_as_connection() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err = CacheError::from(redis::RedisError::from(io_err));
        assert!(err.is_connection());
        assert!(!err.is_not_found());
    }

    #[test]
    fn server_errors_classify_as_command() {
        let server = redis::RedisError::from((redis::ErrorKind::TypeError, "WRONGTYPE"));
        let err = CacheError::from(server);
        assert!(matches!(err, CacheError::Command(_)));
    }

    #[test]
    fn not_found_display_names_key() {
        let err = CacheError::not_found("user:42");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "key not found: user:42");
    }
}
