//! Domain error taxonomy.

use thiserror::Error;
use uuid::Uuid;

use crate::services::document_store::DocumentStoreError;
use crate::services::store::StoreError;

/// Errors surfaced by the SAR lifecycle operations.
#[derive(Debug, Error)]
pub enum SarError {
    /// Intake rejected the request; no row was created.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Subject access request {0} not found")]
    NotFound(Uuid),

    #[error("Subject access request {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Subject access request {0} is in an errored state")]
    IsErrored(Uuid),

    /// The row lock was not acquired in time. Callers may retry.
    #[error("Subject access request {0} is locked by another caller")]
    Busy(Uuid),

    #[error("External service failure: {0}")]
    ExternalService(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SarError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SarError::Busy(_) | SarError::ExternalService(_))
    }
}

impl From<StoreError> for SarError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy(id) => SarError::Busy(id),
            other => SarError::Storage(other.to_string()),
        }
    }
}

impl From<DocumentStoreError> for SarError {
    fn from(err: DocumentStoreError) -> Self {
        SarError::ExternalService(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SarError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => format!("{field}: {message}"),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect();
        messages.sort();

        SarError::Validation(messages.join("; "))
    }
}
