//! Error types for CRM operations
//!
//! Errors are classified by how the caller should surface them:
//! - NotFound: the target id does not exist; report and carry on
//! - Validation / MalformedInput: rejected before any write
//! - Storage: the backend failed

use thiserror::Error;

use crate::db::DbError;

/// Error types for core operations
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl CrmError {
    pub fn not_found(what: &'static str, id: i64) -> Self {
        CrmError::NotFound { what, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CrmError::NotFound { .. })
    }

    /// True for inputs rejected before any write.
    pub fn is_validation(&self) -> bool {
        matches!(self, CrmError::Validation(_) | CrmError::MalformedInput(_))
    }

    /// Message suitable for flashing back to the user.
    pub fn user_message(&self) -> String {
        match self {
            CrmError::NotFound { what, .. } => format!("{what} not found."),
            CrmError::Validation(msg) => msg.clone(),
            CrmError::MalformedInput(msg) => format!("Could not read input: {msg}"),
            CrmError::Database(_) => "Something went wrong saving your changes.".to_string(),
        }
    }
}

/// Serializable error representation for the presentation layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    NotFound,
    Validation,
    Storage,
}

impl From<&CrmError> for ErrorPayload {
    fn from(err: &CrmError) -> Self {
        let error_type = if err.is_not_found() {
            ErrorType::NotFound
        } else if err.is_validation() {
            ErrorType::Validation
        } else {
            ErrorType::Storage
        };

        ErrorPayload {
            message: err.user_message(),
            error_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = CrmError::not_found("Company", 7);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Company 7 not found");
        assert_eq!(err.user_message(), "Company not found.");

        let err = CrmError::validation("Name is required.");
        assert!(err.is_validation());
        assert_eq!(err.user_message(), "Name is required.");

        let err = CrmError::from(DbError::NoGeneratedId);
        assert!(!err.is_not_found() && !err.is_validation());
    }

    #[test]
    fn test_payload_serializes_type() {
        let payload = ErrorPayload::from(&CrmError::validation("Invalid status."));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["errorType"], "validation");
        assert_eq!(json["message"], "Invalid status.");
    }
}
