//! Error types for the storage gateway

use thiserror::Error;

/// Errors raised by a storage provider.
///
/// These never cross the public operations of [`crate::BlobGateway`]; the
/// gateway matches on them to decide how to log, then returns a sentinel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Transient(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound("images/cat.png".to_string());
        assert_eq!(err.to_string(), "Not found: images/cat.png");

        let err = StorageError::PermissionDenied("bucket uploads".to_string());
        assert_eq!(err.to_string(), "Permission denied: bucket uploads");
    }

    #[test]
    fn test_is_not_found() {
        assert!(StorageError::NotFound("x".to_string()).is_not_found());
        assert!(!StorageError::Transient("timeout".to_string()).is_not_found());
    }
}
