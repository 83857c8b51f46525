//! Session acquisition with caching, single flight and retry scheduling.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use facturo_core::credential::{Credential, KeyCipher, SessionBlock, SessionTicket};
use facturo_core::store::CredentialStore;
use facturo_shared::AfipConfig;
use facturo_shared::types::CompanyId;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::client::{LoginError, WsaaClient};
use super::signer::sign_ticket;
use super::ticket::LoginTicketRequest;
use crate::error::AuthError;

/// Hands out valid sessions per company.
///
/// Concurrent callers for the same company share one login round trip.
pub struct SessionAuthenticator {
    store: Arc<dyn CredentialStore>,
    client: WsaaClient,
    cipher: KeyCipher,
    config: AfipConfig,
    locks: DashMap<CompanyId, Arc<Mutex<()>>>,
}

impl SessionAuthenticator {
    /// Creates an authenticator.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: WsaaClient,
        cipher: KeyCipher,
        config: AfipConfig,
    ) -> Self {
        Self {
            store,
            client,
            cipher,
            config,
            locks: DashMap::new(),
        }
    }

    fn margin(&self) -> Duration {
        Duration::seconds(i64::try_from(self.config.session_safety_margin_secs).unwrap_or(i64::MAX))
    }

    fn lock_for(&self, company_id: CompanyId) -> Arc<Mutex<()>> {
        self.locks
            .entry(company_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, company_id: CompanyId) -> Result<Credential, AuthError> {
        self.store
            .find_by_company(company_id)
            .await?
            .ok_or(AuthError::MissingCredential(company_id))
    }

    /// Returns a session valid beyond the safety margin, logging in if needed.
    ///
    /// # Errors
    ///
    /// - `MissingCredential` if the company has no certificate installed
    /// - `SessionAlreadyActive` while a scheduled retry is pending, or when
    ///   the authority reports an active session
    /// - `SigningFailed` before any network call for unusable key material
    /// - `Rejected` / `Transient` for authority and transport failures
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn acquire(&self, company_id: CompanyId) -> Result<SessionTicket, AuthError> {
        let margin = self.margin();
        let credential = self.load(company_id).await?;
        if let Some(ticket) = credential.valid_session(Utc::now(), margin) {
            debug!("Reusing cached session");
            return Ok(ticket.clone());
        }

        let lock = self.lock_for(company_id);
        let _guard = lock.lock().await;

        // Another caller may have logged in while we waited.
        let credential = self.load(company_id).await?;
        let now = Utc::now();
        if let Some(ticket) = credential.valid_session(now, margin) {
            debug!("Session refreshed by a concurrent caller");
            return Ok(ticket.clone());
        }
        if let Some(block) = credential.active_block(now) {
            debug!(retry_at = %block.until, "Session acquisition paused");
            return Err(AuthError::SessionAlreadyActive {
                retry_at: block.until,
            });
        }

        let signed = self.sign(&credential, now)?;
        let endpoint = self.config.wsaa_url_for(credential.environment);

        match self.client.login(&endpoint, &signed).await {
            Ok(ticket) => {
                self.store.save_session(company_id, &ticket).await?;
                info!(expires_at = %ticket.expires_at, "Session acquired");
                Ok(ticket)
            }
            Err(LoginError::AlreadyAuthenticated(message)) => {
                let attempts = credential.session_block.map_or(1, |b| b.attempts + 1);
                let delay = self.config.session_retry.delay_for(attempts);
                let until = now
                    + Duration::from_std(delay).unwrap_or_else(|_| Duration::seconds(86_400));
                self.store
                    .save_session_block(company_id, &SessionBlock { until, attempts })
                    .await?;
                warn!(%message, attempts, retry_at = %until, "Authority reports an active session");
                Err(AuthError::SessionAlreadyActive { retry_at: until })
            }
            Err(LoginError::Rejected { code, message }) => {
                warn!(%code, %message, "Login rejected");
                Err(AuthError::Rejected { code, message })
            }
            Err(LoginError::Transient(message)) => {
                warn!(%message, "Login failed transiently");
                Err(AuthError::Transient(message))
            }
        }
    }

    fn sign(&self, credential: &Credential, now: chrono::DateTime<Utc>) -> Result<String, AuthError> {
        if credential.certificate_not_after <= now {
            return Err(AuthError::SigningFailed(format!(
                "certificate expired at {}",
                credential.certificate_not_after
            )));
        }
        let key = credential
            .unseal_key(&self.cipher)
            .map_err(|e| AuthError::SigningFailed(e.to_string()))?;

        let ttl = Duration::seconds(i64::try_from(self.config.login_ticket_ttl_secs).unwrap_or(600));
        let request = LoginTicketRequest::new(&self.config.service_name, now, ttl);
        let document = request
            .to_xml()
            .map_err(|e| AuthError::SigningFailed(e.to_string()))?;

        sign_ticket(
            &document,
            credential.certificate_pem.as_bytes(),
            &key.pem,
            &key.password,
        )
    }

    /// Drops the cached session so the next call logs in again.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the credential cannot be updated.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn invalidate(&self, company_id: CompanyId) -> Result<(), AuthError> {
        let lock = self.lock_for(company_id);
        let _guard = lock.lock().await;
        self.store.clear_session(company_id).await?;
        info!("Cached session invalidated");
        Ok(())
    }
}
