use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    #[error("Cache operation timed out: {0}")]
    Timeout(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),
}

impl CacheError {
    /// Returns true when the error means the store itself could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Timeout(_))
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_display() {
        let error = CacheError::ConnectionFailed("timeout".to_string());
        assert_eq!(error.to_string(), "Cache connection failed: timeout");
    }

    #[test]
    fn test_invalid_pattern_display() {
        let error = CacheError::InvalidPattern("job:[78]".to_string());
        assert_eq!(error.to_string(), "Invalid key pattern: job:[78]");
    }

    #[test]
    fn test_is_unavailable() {
        assert!(CacheError::ConnectionFailed("refused".into()).is_unavailable());
        assert!(CacheError::Timeout("5ms".into()).is_unavailable());
        assert!(!CacheError::OperationFailed("WRONGTYPE".into()).is_unavailable());
        assert!(!CacheError::Serialization("eof".into()).is_unavailable());
        assert!(!CacheError::InvalidPattern("[".into()).is_unavailable());
    }
}
