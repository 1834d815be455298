use serde::{Deserialize, Serialize};

/// Structured error types crossing the controller's collaborator seams.
///
/// Remote collaborators report failures with these variants; the controller
/// converts them into state (a load error flag) or user notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ApiError {
    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rejected by backend: {message}")]
    Rejected { message: String },

    #[error("Subscription closed: {message}")]
    SubscriptionClosed { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode {
            message: err.to_string(),
        }
    }
}
