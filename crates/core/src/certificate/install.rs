//! Certificate parsing and install-time checks.

use chrono::{DateTime, Utc};
use facturo_shared::types::Cuit;
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use super::error::ValidationError;

/// What the install checks need from a certificate.
#[derive(Debug)]
pub struct ParsedCertificate {
    /// The certificate.
    pub x509: X509,
    /// Digits of the subject serial number.
    pub subject_identity: Option<String>,
    /// Validity start.
    pub not_before: DateTime<Utc>,
    /// Validity end.
    pub not_after: DateTime<Utc>,
}

impl ParsedCertificate {
    /// Parses a PEM certificate.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the PEM or its validity dates cannot be read.
    pub fn from_pem(pem: &str) -> Result<Self, ValidationError> {
        let x509 = X509::from_pem(pem.as_bytes())
            .map_err(|_| ValidationError::Malformed("certificate".to_string()))?;

        let subject_identity = x509
            .subject_name()
            .entries_by_nid(Nid::SERIALNUMBER)
            .next()
            .map(|entry| {
                entry
                    .data()
                    .as_slice()
                    .iter()
                    .filter(|b| b.is_ascii_digit())
                    .map(|b| char::from(*b))
                    .collect::<String>()
            })
            .filter(|digits| !digits.is_empty());

        let not_before = asn1_to_utc(x509.not_before())?;
        let not_after = asn1_to_utc(x509.not_after())?;

        Ok(Self {
            x509,
            subject_identity,
            not_before,
            not_after,
        })
    }

    /// Identity check: the subject serial number carries the company CUIT.
    ///
    /// # Errors
    ///
    /// Returns `IdentityMismatch` otherwise.
    pub fn check_identity(&self, cuit: &Cuit) -> Result<(), ValidationError> {
        match &self.subject_identity {
            Some(found) if found == cuit.digits() => Ok(()),
            found => Err(ValidationError::IdentityMismatch {
                expected: cuit.clone(),
                found: found.clone().unwrap_or_else(|| "none".to_string()),
            }),
        }
    }

    /// Key check: the certificate was issued for `key`.
    ///
    /// RSA keys are compared by modulus, other key types by public key.
    ///
    /// # Errors
    ///
    /// Returns `KeyMismatch` otherwise.
    pub fn check_key(&self, key: &PKey<Private>) -> Result<(), ValidationError> {
        let public = self
            .x509
            .public_key()
            .map_err(|_| ValidationError::Malformed("certificate public key".to_string()))?;

        let matches = match (public.rsa(), key.rsa()) {
            (Ok(cert_rsa), Ok(key_rsa)) => cert_rsa.n() == key_rsa.n(),
            _ => public.public_eq(key),
        };
        if matches {
            Ok(())
        } else {
            Err(ValidationError::KeyMismatch)
        }
    }

    /// Validity check: `not_before <= now <= not_after`.
    ///
    /// # Errors
    ///
    /// Returns `NotYetValid` or `Expired`.
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if now < self.not_before {
            return Err(ValidationError::NotYetValid(self.not_before));
        }
        if now > self.not_after {
            return Err(ValidationError::Expired(self.not_after));
        }
        Ok(())
    }
}

/// Loads a private key PEM, encrypted or not.
///
/// # Errors
///
/// Returns `WrongPassword` for an encrypted key that does not open, and
/// `Malformed` for anything else.
pub fn load_private_key(pem: &[u8], password: &[u8]) -> Result<PKey<Private>, ValidationError> {
    PKey::private_key_from_pem_passphrase(pem, password).map_err(|_| {
        if is_encrypted_pem(pem) {
            ValidationError::WrongPassword
        } else {
            ValidationError::Malformed("private key".to_string())
        }
    })
}

fn is_encrypted_pem(pem: &[u8]) -> bool {
    pem.windows(b"ENCRYPTED".len()).any(|w| w == b"ENCRYPTED")
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, ValidationError> {
    let malformed = || ValidationError::Malformed("certificate validity".to_string());
    let epoch = Asn1Time::from_unix(0).map_err(|_| malformed())?;
    let diff = epoch.diff(time).map_err(|_| malformed())?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0).ok_or_else(malformed)
}
