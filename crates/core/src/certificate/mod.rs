//! Certificate lifecycle: request generation, install validation, expiry.
//!
//! # Install checks
//!
//! Run in order, the first failure aborts and nothing is returned:
//! 1. Identity: the subject serial number carries the company's CUIT
//! 2. Key: the certificate's RSA modulus equals the private key's
//! 3. Validity: `not_before <= now <= not_after`

pub mod error;
pub mod expiry;
pub mod install;
pub mod request;

pub use error::ValidationError;
pub use expiry::CertificateStatus;
pub use install::{ParsedCertificate, load_private_key};
pub use request::{CertificateRequest, CompanyIdentity, subject_serial};

use chrono::{DateTime, Utc};
use facturo_shared::config::AfipEnvironment;
use facturo_shared::types::{CompanyId, CredentialId};

use crate::credential::{Credential, KeyCipher};

/// Private key to pair with an installed certificate.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// The sealed key generated together with the signing request.
    Pending(String),
    /// A key pair the company already had.
    Provided {
        /// Private key PEM.
        pem: String,
        /// Passphrase, if the key is encrypted.
        password: Option<String>,
    },
}

/// Certificate lifecycle manager.
///
/// Pure: callers persist the pending key and the resulting credential.
#[derive(Debug, Clone)]
pub struct CertificateManager {
    cipher: KeyCipher,
    warning_days: i64,
}

impl CertificateManager {
    /// Creates a manager sealing keys with `cipher`.
    #[must_use]
    pub const fn new(cipher: KeyCipher, warning_days: i64) -> Self {
        Self {
            cipher,
            warning_days,
        }
    }

    /// Generates an RSA key pair and a signing request for `identity`.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if key generation or sealing fails.
    pub fn generate_request(
        &self,
        identity: &CompanyIdentity,
    ) -> Result<CertificateRequest, ValidationError> {
        let unavailable = |e: &dyn std::fmt::Display| ValidationError::KeyUnavailable(e.to_string());

        let key = request::generate_key().map_err(|e| unavailable(&e))?;
        let csr = request::build_request(identity, &key).map_err(|e| unavailable(&e))?;
        let csr_pem = csr.to_pem().map_err(|e| unavailable(&e))?;
        let key_pem = key.private_key_to_pem_pkcs8().map_err(|e| unavailable(&e))?;
        let sealed_key = self.cipher.seal(&key_pem).map_err(|e| unavailable(&e))?;

        tracing::info!(cuit = %identity.cuit, "Generated certificate signing request");

        Ok(CertificateRequest {
            csr_pem: String::from_utf8_lossy(&csr_pem).into_owned(),
            sealed_key,
        })
    }

    /// Validates a certificate against the company and its key, and builds
    /// the credential to persist.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a `ValidationError`.
    pub fn install(
        &self,
        company_id: CompanyId,
        identity: &CompanyIdentity,
        certificate_pem: &str,
        key: KeySource,
        environment: AfipEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Credential, ValidationError> {
        let certificate = ParsedCertificate::from_pem(certificate_pem)?;
        certificate.check_identity(&identity.cuit)?;

        let (sealed_private_key, sealed_key_password) = match key {
            KeySource::Pending(sealed) => {
                let pem = self
                    .cipher
                    .open(&sealed)
                    .map_err(|e| ValidationError::KeyUnavailable(e.to_string()))?;
                let private = load_private_key(&pem, b"")?;
                certificate.check_key(&private)?;
                (sealed, None)
            }
            KeySource::Provided { pem, password } => {
                let pass = password.as_deref().unwrap_or_default();
                let private = load_private_key(pem.as_bytes(), pass.as_bytes())?;
                certificate.check_key(&private)?;
                let sealed_key = self.seal(pem.as_bytes())?;
                let sealed_password = password.map(|p| self.seal(p.as_bytes())).transpose()?;
                (sealed_key, sealed_password)
            }
        };

        certificate.check_validity(now)?;

        tracing::info!(
            %company_id,
            cuit = %identity.cuit,
            not_after = %certificate.not_after,
            "Certificate validated"
        );

        Ok(Credential {
            id: CredentialId::new(),
            company_id,
            cuit: identity.cuit.clone(),
            environment,
            certificate_pem: certificate_pem.to_string(),
            sealed_private_key,
            sealed_key_password,
            certificate_not_before: certificate.not_before,
            certificate_not_after: certificate.not_after,
            session: None,
            session_block: None,
        })
    }

    /// Expiry status of an installed credential.
    #[must_use]
    pub fn expiry_status(&self, credential: &Credential, now: DateTime<Utc>) -> CertificateStatus {
        CertificateStatus::at(credential.certificate_not_after, now, self.warning_days)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, ValidationError> {
        self.cipher
            .seal(plaintext)
            .map_err(|e| ValidationError::KeyUnavailable(e.to_string()))
    }
}
