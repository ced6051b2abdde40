//! Error type of the service layer.
//!
//! Every failure carries a [`ErrorKind`] so the HTTP layer can map it to a
//! status code without inspecting messages.

use thiserror::Error;

use crate::db::repository::RepositoryError;
use crate::ingest::IngestError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Caller-facing classification of a service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unrecognized import file
    Format,
    /// A referenced record (seasonal set, calculation) does not exist
    ReferenceIntegrity,
    /// Calculation not in the required status or coverage insufficient
    Admissibility,
    /// Seasonal set modification blocked by calculations using it
    Guard,
    NotFound,
    /// Request parameters out of range
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Format(#[from] IngestError),

    #[error("{0}")]
    ReferenceIntegrity(String),

    #[error("{0}")]
    Admissibility(String),

    #[error("{0}")]
    Guard(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Format(_) => ErrorKind::Format,
            ServiceError::ReferenceIntegrity(_) => ErrorKind::ReferenceIntegrity,
            ServiceError::Admissibility(_) => ErrorKind::Admissibility,
            ServiceError::Guard(_) => ErrorKind::Guard,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Repository(RepositoryError::NotFound { .. }) => ErrorKind::NotFound,
            ServiceError::Repository(RepositoryError::Validation { .. }) => ErrorKind::Validation,
            ServiceError::Repository(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Reclassify a missing referenced record as a reference-integrity failure.
    pub fn missing_reference(err: RepositoryError, what: impl std::fmt::Display) -> Self {
        match err {
            RepositoryError::NotFound { .. } => {
                ServiceError::ReferenceIntegrity(format!("{} does not exist", what))
            }
            other => ServiceError::Repository(other),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        ServiceError::Repository(err)
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("Background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let format: ServiceError = IngestError::EmptyWorkbook("x.xlsx".into()).into();
        assert_eq!(format.kind(), ErrorKind::Format);

        let missing: ServiceError = RepositoryError::not_found("calc 5").into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let down: ServiceError = RepositoryError::connection("refused").into();
        assert_eq!(down.kind(), ErrorKind::Internal);

        assert_eq!(
            ServiceError::Admissibility("30 of 31 days".into()).kind(),
            ErrorKind::Admissibility
        );
    }
}
