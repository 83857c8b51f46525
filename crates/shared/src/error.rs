//! Application-wide error types.
//!
//! Domain crates keep their own error enums; this envelope is what
//! collaborators (HTTP layer, job runners) receive at the boundary.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (bad certificate, malformed request).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Business rule violation (insufficient balance, duplicate number).
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// The tax authority actively refused the request.
    #[error("Rejected by tax authority: {0}")]
    AuthorityRejected(String),

    /// The caller has to wait before retrying (e.g. session already active).
    #[error("Retry later: {0}")]
    RetryLater(String),

    /// Transient failure talking to the tax authority.
    #[error("External service unavailable: {0}")]
    ExternalService(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::BusinessRule(_) | Self::AuthorityRejected(_) => 422,
            Self::RetryLater(_) => 429,
            Self::ExternalService(_) => 503,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BusinessRule(_) => "BUSINESS_RULE_VIOLATION",
            Self::AuthorityRejected(_) => "AUTHORITY_REJECTED",
            Self::RetryLater(_) => "RETRY_LATER",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if a caller may retry the same request with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::Database(_))
    }
}
