use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Operation not permitted: {0}")]
    NotPermitted(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Index {index} is out of range (resolvable extent: {extent})")]
    OutOfRange { index: usize, extent: usize },

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl CollectionError {
    /// True for failures detected locally, before any mutation or remote call.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotPermitted(_) | Self::NotFound(_) | Self::OutOfRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CollectionError>;

impl<T> From<std::sync::PoisonError<T>> for CollectionError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for CollectionError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(CollectionError::NotPermitted("query".into()).is_precondition());
        assert!(CollectionError::OutOfRange { index: 3, extent: 2 }.is_precondition());
        assert!(!CollectionError::RemoteFailure("boom".into()).is_precondition());
        assert!(!CollectionError::Canceled.is_precondition());
    }

    #[test]
    fn test_io_error_maps_to_persistence_failure() {
        let err: CollectionError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, CollectionError::PersistenceFailure(_)));
    }
}
