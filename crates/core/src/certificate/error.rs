//! Certificate validation errors.

use chrono::{DateTime, Utc};
use facturo_shared::types::Cuit;
use thiserror::Error;

/// Reasons a certificate cannot be installed. Each names the failing check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The certificate was issued for a different tax identifier.
    #[error("Certificate identity {found} does not match company CUIT {expected}")]
    IdentityMismatch {
        /// The company's CUIT.
        expected: Cuit,
        /// Identifier found in the certificate subject.
        found: String,
    },

    /// The certificate's public key does not belong to the private key.
    #[error("Certificate public key does not match the private key")]
    KeyMismatch,

    /// The certificate's validity ended.
    #[error("Certificate expired at {0}")]
    Expired(DateTime<Utc>),

    /// The certificate's validity has not started.
    #[error("Certificate is not valid before {0}")]
    NotYetValid(DateTime<Utc>),

    /// The certificate or key could not be parsed.
    #[error("Malformed {0}")]
    Malformed(String),

    /// The private key passphrase is wrong.
    #[error("Wrong private key password")]
    WrongPassword,

    /// No pending key exists, or it cannot be decrypted.
    #[error("Private key unavailable: {0}")]
    KeyUnavailable(String),
}

impl ValidationError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IdentityMismatch { .. } => "CERT_IDENTITY_MISMATCH",
            Self::KeyMismatch => "CERT_KEY_MISMATCH",
            Self::Expired(_) => "CERT_EXPIRED",
            Self::NotYetValid(_) => "CERT_NOT_YET_VALID",
            Self::Malformed(_) => "CERT_MALFORMED",
            Self::WrongPassword => "CERT_WRONG_PASSWORD",
            Self::KeyUnavailable(_) => "CERT_KEY_UNAVAILABLE",
        }
    }
}
