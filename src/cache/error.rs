//! Cache error types.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("Cache connection failed: {0}")]
    Connection(String),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend rejected the command.
    #[error("Cache command failed: {0}")]
    Command(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Command(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::Connection("redis://localhost:6379".to_string());
        assert!(err.to_string().contains("redis://localhost:6379"));

        let err = CacheError::Serialization("invalid JSON".to_string());
        assert!(err.to_string().contains("invalid JSON"));
    }
}
