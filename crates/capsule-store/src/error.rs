use std::error::Error;
use std::fmt;

use capsule_core::ValidationError;

/// Failure taxonomy shared by the store and the service operations.
#[derive(Debug)]
pub enum StoreError {
    /// Payload failed shape or required-field checks; nothing was persisted.
    InvalidInput(String),
    /// A capsule with this id already exists.
    DuplicateKey(String),
    /// No capsule with this id.
    NotFound(String),
    /// The database directory or file could not be created, opened, read
    /// or written, or holds rows that cannot be decoded.
    StorageUnavailable {
        op: &'static str,
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StoreError {
    pub fn storage(op: &'static str, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        StoreError::StorageUnavailable {
            op,
            source: source.into(),
        }
    }

    /// Stable machine-readable code for adapters.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::InvalidInput(_) => "invalid_input",
            StoreError::DuplicateKey(_) => "duplicate_key",
            StoreError::NotFound(_) => "not_found",
            StoreError::StorageUnavailable { .. } => "storage_unavailable",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            StoreError::DuplicateKey(id) => write!(f, "capsule already exists: {id}"),
            StoreError::NotFound(id) => write!(f, "capsule not found: {id}"),
            StoreError::StorageUnavailable { op, source } => {
                write!(f, "storage unavailable during {op}: {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::StorageUnavailable { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::storage("sqlite", e)
    }
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::InvalidInput(e.to_string())
    }
}

/// Adapter for `map_err` that tags a storage failure with its operation.
pub(crate) fn during<E>(op: &'static str) -> impl FnOnce(E) -> StoreError
where
    E: Into<Box<dyn Error + Send + Sync>>,
{
    move |e| StoreError::storage(op, e)
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(StoreError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(StoreError::DuplicateKey("x".into()).kind(), "duplicate_key");
        assert_eq!(StoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            StoreError::storage("open", "disk full").kind(),
            "storage_unavailable"
        );
    }

    #[test]
    fn test_storage_error_carries_op_and_cause() {
        let err = StoreError::storage("insert", "disk full");
        assert_eq!(err.to_string(), "storage unavailable during insert: disk full");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_validation_converts_to_invalid_input() {
        let err: StoreError = ValidationError::EmptyTitle.into();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
