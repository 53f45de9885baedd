//! Service-level error taxonomy shared by the prescription and dispense services.

use crate::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(DatabaseError),
}

impl ServiceError {
    /// A request body whose JSON or field types could not be read.
    pub(crate) fn malformed_body(err: serde_json::Error) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict { .. } => ServiceError::Conflict(
                "Prescription was modified by another request, reload and retry".into(),
            ),
            DatabaseError::NotFound { .. } => {
                ServiceError::NotFound("Prescription not found".into())
            }
            other => ServiceError::Database(other),
        }
    }
}
