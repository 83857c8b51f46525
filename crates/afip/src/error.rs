//! Error taxonomy for the remote protocols and the fiscal service.
//!
//! - Configuration/validation: bad certificate, key mismatch, malformed request
//! - Authority-rejected: the authority refused; surfaced with its own code
//! - Transient: timeouts and connection errors; re-query before retrying
//! - Invariant violations: detected before any network call

use chrono::{DateTime, Utc};
use facturo_core::balance::BalanceError;
use facturo_core::certificate::ValidationError;
use facturo_core::store::StoreError;
use facturo_core::voucher::VoucherError;
use facturo_shared::AppError;
use facturo_shared::types::{CompanyId, VoucherId};
use thiserror::Error;

/// Session authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The login ticket could not be signed. No request was sent.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// The authority already issued a session that has not expired.
    #[error("A session is already active; retry after {retry_at}")]
    SessionAlreadyActive {
        /// Earliest instant a new request is scheduled for.
        retry_at: DateTime<Utc>,
    },

    /// The authority refused the login ticket.
    #[error("Authentication rejected [{code}]: {message}")]
    Rejected {
        /// Authority fault code.
        code: String,
        /// Authority fault message.
        message: String,
    },

    /// Transport failure or unreadable response.
    #[error("Authentication service unavailable: {0}")]
    Transient(String),

    /// The company has no installed certificate.
    #[error("No credential installed for company {0}")]
    MissingCredential(CompanyId),

    /// Reading or writing the credential failed.
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SigningFailed(_) => "AUTH_SIGNING_FAILED",
            Self::SessionAlreadyActive { .. } => "AUTH_SESSION_ALREADY_ACTIVE",
            Self::Rejected { .. } => "AUTH_REJECTED",
            Self::Transient(_) => "AUTH_TRANSIENT",
            Self::MissingCredential(_) => "AUTH_MISSING_CREDENTIAL",
            Self::Store(_) => "AUTH_STORE_ERROR",
        }
    }

    /// Returns true if retrying with backoff can succeed.
    ///
    /// `SessionAlreadyActive` is not retryable: the caller waits until `retry_at`.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Classification of a voucher protocol failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The authority reported errors; the request must be corrected.
    Rejected,
    /// The voucher was not approved; observations explain why.
    Observed,
    /// The outcome is unknown: transport failure or unreadable response.
    Transient,
}

/// An error or observation reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityMessage {
    /// Authority code.
    pub code: i64,
    /// Authority message.
    pub message: String,
}

impl std::fmt::Display for AuthorityMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Authority codes meaning the token/sign pair was not accepted.
const SESSION_FAILURE_CODES: std::ops::RangeInclusive<i64> = 600..=601;

/// Voucher protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct ProtocolError {
    /// Classification.
    pub kind: ProtocolErrorKind,
    /// The authority's own codes and messages.
    pub details: Vec<AuthorityMessage>,
    /// Summary.
    pub message: String,
}

impl ProtocolError {
    /// Authority-level errors.
    #[must_use]
    pub fn rejected(details: Vec<AuthorityMessage>) -> Self {
        let message = join(&details);
        Self {
            kind: ProtocolErrorKind::Rejected,
            details,
            message,
        }
    }

    /// Not approved, with observations.
    #[must_use]
    pub fn observed(details: Vec<AuthorityMessage>) -> Self {
        let message = join(&details);
        Self {
            kind: ProtocolErrorKind::Observed,
            details,
            message,
        }
    }

    /// Unknown outcome.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProtocolErrorKind::Transient,
            details: Vec::new(),
            message: message.into(),
        }
    }

    /// Returns true if the authority did not accept the session credentials.
    #[must_use]
    pub fn is_session_failure(&self) -> bool {
        self.kind == ProtocolErrorKind::Rejected
            && self
                .details
                .iter()
                .any(|d| SESSION_FAILURE_CODES.contains(&d.code))
    }

    /// Returns true if the caller may retry after re-querying state.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == ProtocolErrorKind::Transient
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self.kind {
            ProtocolErrorKind::Rejected => "AUTHORITY_REJECTED",
            ProtocolErrorKind::Observed => "AUTHORITY_OBSERVED",
            ProtocolErrorKind::Transient => "AUTHORITY_TRANSIENT",
        }
    }
}

fn join(details: &[AuthorityMessage]) -> String {
    details
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the fiscal service operations.
#[derive(Debug, Error)]
pub enum FiscalError {
    /// Session acquisition failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The voucher protocol failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Certificate install checks failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A balance invariant would be broken.
    #[error(transparent)]
    Balance(#[from] BalanceError),

    /// A voucher invariant would be broken.
    #[error(transparent)]
    Voucher(#[from] VoucherError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The voucher does not exist.
    #[error("Voucher {0} not found")]
    VoucherNotFound(VoucherId),
}

impl FiscalError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::Validation(e) => e.error_code(),
            Self::Balance(e) => e.error_code(),
            Self::Voucher(e) => e.error_code(),
            Self::Store(_) => "STORE_ERROR",
            Self::VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
        }
    }

    /// Returns true if the same call may be retried with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_retryable(),
            Self::Protocol(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::Validation(_) | Self::Balance(_) | Self::Voucher(_) | Self::VoucherNotFound(_) => {
                false
            }
        }
    }
}

impl From<&FiscalError> for AppError {
    fn from(err: &FiscalError) -> Self {
        let message = err.to_string();
        match err {
            FiscalError::Auth(AuthError::SessionAlreadyActive { .. }) => Self::RetryLater(message),
            FiscalError::Auth(AuthError::Rejected { .. }) => Self::AuthorityRejected(message),
            FiscalError::Auth(AuthError::SigningFailed(_)) | FiscalError::Validation(_) => {
                Self::Validation(message)
            }
            FiscalError::Auth(AuthError::MissingCredential(_)) | FiscalError::VoucherNotFound(_) => {
                Self::NotFound(message)
            }
            FiscalError::Auth(AuthError::Transient(_)) => Self::ExternalService(message),
            FiscalError::Auth(AuthError::Store(e)) | FiscalError::Store(e) => match e {
                StoreError::NotFound(_) => Self::NotFound(message),
                StoreError::Conflict(_) => Self::BusinessRule(message),
                StoreError::Database(_) => Self::Database(message),
            },
            FiscalError::Protocol(e) => match e.kind {
                ProtocolErrorKind::Transient => Self::ExternalService(message),
                ProtocolErrorKind::Rejected | ProtocolErrorKind::Observed => {
                    Self::AuthorityRejected(message)
                }
            },
            FiscalError::Balance(_) | FiscalError::Voucher(_) => Self::BusinessRule(message),
        }
    }
}

impl From<FiscalError> for AppError {
    fn from(err: FiscalError) -> Self {
        Self::from(&err)
    }
}
