//! Error types for the clinicdesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all clinicdesk operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Record store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Action errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- I/O (sockets, files) ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The consumer tore the stream down itself. Never a failure.
    #[error("Stream cancelled by consumer")]
    Cancelled,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// True for the self-inflicted cancellation that ends a stream early.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Stored data is corrupt: {0}")]
    Serialization(String),

    #[error("Record store unreachable: {0}")]
    Transport(String),

    #[error("Record store returned {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error(
        "Invalid resource type: {0}. Valid types are: patients, practitioners, appointments, encounters, observations, conditions, medication-requests"
    )]
    InvalidKind(String),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Resource not found: {resource_type} with id \"{id}\"")]
    NotFound { resource_type: String, id: String },

    #[error("No update fields provided")]
    NoUpdateFields,

    #[error("{0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn only_cancelled_counts_as_cancellation() {
        assert!(ProviderError::Cancelled.is_cancellation());
        assert!(!ProviderError::Network("reset".into()).is_cancellation());
    }

    #[test]
    fn action_error_names_the_missing_field() {
        let err = ActionError::MissingParameter("practitionerId".into());
        assert_eq!(err.to_string(), "Missing required parameter: practitionerId");
    }

    #[test]
    fn invalid_kind_lists_valid_collections() {
        let err = StoreError::InvalidKind("pets".into());
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid resource type: pets."));
        assert!(msg.contains("medication-requests"));
    }
}
