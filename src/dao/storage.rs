use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A revision-checked write lost against a concurrent writer.
    #[error("concurrent update of {entity} `{id}` (expected revision {expected})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
    },
    /// An insert found a record with the same id already stored.
    #[error("{entity} `{id}` already exists")]
    AlreadyExists { entity: &'static str, id: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether a concurrent writer got there first; the caller may re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::Conflict { .. } | StorageError::AlreadyExists { .. }
        )
    }
}
