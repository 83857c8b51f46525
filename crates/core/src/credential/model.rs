//! Per-company authority credential.

use chrono::{DateTime, Duration, Utc};
use facturo_shared::config::AfipEnvironment;
use facturo_shared::types::{CompanyId, CredentialId, Cuit};
use serde::{Deserialize, Serialize};

use super::cipher::{CipherError, KeyCipher};

/// Token and signature granted by the session authenticator.
///
/// Both halves are stored together or not at all.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    /// Session token.
    pub token: String,
    /// Session signature.
    pub sign: String,
    /// When the authority stops accepting the pair.
    pub expires_at: DateTime<Utc>,
}

impl SessionTicket {
    /// Returns true if the ticket outlives `now + margin`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }
}

impl std::fmt::Debug for SessionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTicket")
            .field("token", &"[REDACTED]")
            .field("sign", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Scheduled retry after the authority reported an already active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBlock {
    /// No new session is requested before this instant.
    pub until: DateTime<Utc>,
    /// Consecutive "already active" answers so far.
    pub attempts: u32,
}

impl SessionBlock {
    /// Returns true while acquisition must not be attempted.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.until
    }
}

/// A company's certificate, key and cached session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential ID.
    pub id: CredentialId,
    /// Owning company, one credential per company.
    pub company_id: CompanyId,
    /// Tax identifier the certificate was issued for.
    pub cuit: Cuit,
    /// Authority environment.
    pub environment: AfipEnvironment,
    /// X.509 certificate, PEM.
    pub certificate_pem: String,
    /// PKCS#8 private key PEM, sealed with the key encryption key.
    pub sealed_private_key: String,
    /// Sealed passphrase of the private key, if it has one.
    pub sealed_key_password: Option<String>,
    /// Certificate validity start.
    pub certificate_not_before: DateTime<Utc>,
    /// Certificate validity end.
    pub certificate_not_after: DateTime<Utc>,
    /// Cached session.
    pub session: Option<SessionTicket>,
    /// Pending retry after an "already active" answer.
    pub session_block: Option<SessionBlock>,
}

/// Decrypted key material, held only for the duration of a signing call.
pub struct UnsealedKey {
    /// Private key PEM.
    pub pem: Vec<u8>,
    /// Passphrase, empty if the key is not encrypted.
    pub password: Vec<u8>,
}

impl Credential {
    /// The cached session if it outlives `now + margin`.
    #[must_use]
    pub fn valid_session(&self, now: DateTime<Utc>, margin: Duration) -> Option<&SessionTicket> {
        self.session.as_ref().filter(|s| s.is_valid_at(now, margin))
    }

    /// The active block, if acquisition is currently paused.
    #[must_use]
    pub fn active_block(&self, now: DateTime<Utc>) -> Option<&SessionBlock> {
        self.session_block.as_ref().filter(|b| b.is_active(now))
    }

    /// Decrypts the private key and its passphrase.
    ///
    /// # Errors
    ///
    /// Returns an error if either sealed value cannot be opened.
    pub fn unseal_key(&self, cipher: &KeyCipher) -> Result<UnsealedKey, CipherError> {
        let pem = cipher.open(&self.sealed_private_key)?;
        let password = match &self.sealed_key_password {
            Some(sealed) => cipher.open(sealed)?,
            None => Vec::new(),
        };
        Ok(UnsealedKey { pem, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(expires_at: DateTime<Utc>) -> SessionTicket {
        SessionTicket {
            token: "PD94bWwgdmVyc2lvbj0iMS4wIj8+".to_string(),
            sign: "c2lnbmF0dXJl".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_session_margin() {
        let now = Utc::now();
        let margin = Duration::minutes(5);
        assert!(ticket(now + Duration::hours(1)).is_valid_at(now, margin));
        assert!(!ticket(now + Duration::minutes(5)).is_valid_at(now, margin));
        assert!(!ticket(now - Duration::minutes(1)).is_valid_at(now, margin));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", ticket(Utc::now()));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("c2lnbmF0dXJl"));
    }

    #[test]
    fn test_block_expires() {
        let now = Utc::now();
        let block = SessionBlock {
            until: now + Duration::hours(12),
            attempts: 1,
        };
        assert!(block.is_active(now));
        assert!(!block.is_active(now + Duration::hours(12)));
    }

    #[test]
    fn test_unseal_key() {
        let cipher = KeyCipher::new([3u8; 32]);
        let now = Utc::now();
        let credential = Credential {
            id: CredentialId::new(),
            company_id: CompanyId::new(),
            cuit: Cuit::parse("20-11111111-2").unwrap(),
            environment: AfipEnvironment::Sandbox,
            certificate_pem: String::new(),
            sealed_private_key: cipher.seal(b"key").unwrap(),
            sealed_key_password: Some(cipher.seal(b"pass").unwrap()),
            certificate_not_before: now,
            certificate_not_after: now + Duration::days(365),
            session: None,
            session_block: None,
        };
        let key = credential.unseal_key(&cipher).unwrap();
        assert_eq!(key.pem, b"key");
        assert_eq!(key.password, b"pass");
        assert!(credential.valid_session(now, Duration::minutes(5)).is_none());
    }
}
