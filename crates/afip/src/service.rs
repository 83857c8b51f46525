//! Fiscal service: the operations collaborators call.
//!
//! - `acquire_session`: cached, single-flight session per company
//! - `next_voucher_number`: forecast `max(remote, ledger, counter) + 1`
//! - `authorize_voucher`: claim `remote + 1`, request the CAE, persist, adjust balances
//! - `recompute_balance`: idempotent balance recomputation for an invoice
//!
//! Authorizations for one (company, sales point, type) run one at a time:
//! the authority only accepts `last + 1`.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use facturo_core::balance::{BalanceError, BalanceLedger, BalanceSnapshot, BalanceView};
use facturo_core::certificate::{
    CertificateManager, CertificateRequest, CertificateStatus, CompanyIdentity, KeySource,
    ValidationError,
};
use facturo_core::credential::{Credential, KeyCipher, SessionTicket};
use facturo_core::sequence::{Reservation, SequenceKey};
use facturo_core::store::{CredentialStore, StoreError, VoucherStore};
use facturo_core::voucher::{
    Authorization, LinkedVoucherRef, Voucher, VoucherError, VoucherKind, VoucherType,
};
use facturo_shared::types::{CompanyId, VoucherId};
use facturo_shared::{AfipConfig, AfipEnvironment, AppConfig, AppError};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::{AuthError, AuthorityMessage, FiscalError, ProtocolError, ProtocolErrorKind};
use crate::transport::{HttpTransport, SoapTransport};
use crate::wsaa::{SessionAuthenticator, WsaaClient};
use crate::wsfe::{AuthorizationRequest, AuthorizationResult, ServerStatus, WsfeAuth, WsfeClient};

/// What the authority holds for a number submitted with an unknown outcome.
enum Recorded {
    /// Recorded for this voucher, now stored locally too.
    Adopted(Voucher),
    /// Not recorded for this voucher.
    Absent { remote_last: u64 },
}

/// Result of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    /// The voucher with number and authorization recorded.
    pub voucher: Voucher,
    /// Observations the authority returned with the approval.
    pub observations: Vec<AuthorityMessage>,
    /// The CAE was recovered after a lost response instead of freshly granted.
    pub recovered: bool,
    /// Balance of the original voucher for notes, or the voucher's own
    /// opening balance if notes can reference it.
    pub balance: Option<BalanceSnapshot>,
}

type LockMap<K> = DashMap<K, Arc<Mutex<()>>>;

fn lock_for<K: std::hash::Hash + Eq>(map: &LockMap<K>, key: K) -> Arc<Mutex<()>> {
    map.entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Orchestrates sessions, numbering, authorization and balances.
pub struct FiscalService {
    authenticator: SessionAuthenticator,
    wsfe: WsfeClient,
    credentials: Arc<dyn CredentialStore>,
    vouchers: Arc<dyn VoucherStore>,
    certificates: CertificateManager,
    config: AfipConfig,
    sequence_locks: LockMap<SequenceKey>,
    balance_locks: LockMap<VoucherId>,
}

impl FiscalService {
    /// Creates a service over explicit collaborators.
    #[must_use]
    pub fn new(
        config: AfipConfig,
        cipher: KeyCipher,
        credentials: Arc<dyn CredentialStore>,
        vouchers: Arc<dyn VoucherStore>,
        transport: Arc<dyn SoapTransport>,
    ) -> Self {
        let authenticator = SessionAuthenticator::new(
            Arc::clone(&credentials),
            WsaaClient::new(Arc::clone(&transport)),
            cipher.clone(),
            config.clone(),
        );
        Self {
            authenticator,
            wsfe: WsfeClient::new(transport),
            credentials,
            vouchers,
            certificates: CertificateManager::new(cipher, config.certificate_warning_days),
            config,
            sequence_locks: DashMap::new(),
            balance_locks: DashMap::new(),
        }
    }

    /// Creates a service talking HTTPS, from application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the key encryption key or the HTTP client are invalid.
    pub fn from_config(
        config: &AppConfig,
        credentials: Arc<dyn CredentialStore>,
        vouchers: Arc<dyn VoucherStore>,
    ) -> Result<Self, AppError> {
        let cipher = KeyCipher::from_base64(&config.security.key_encryption_key)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let transport = HttpTransport::new(config.afip.request_timeout())
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Self::new(
            config.afip.clone(),
            cipher,
            credentials,
            vouchers,
            Arc::new(transport),
        ))
    }

    async fn credential(&self, company_id: CompanyId) -> Result<Credential, FiscalError> {
        self.credentials
            .find_by_company(company_id)
            .await?
            .ok_or_else(|| AuthError::MissingCredential(company_id).into())
    }

    async fn voucher(&self, id: VoucherId) -> Result<Voucher, FiscalError> {
        self.vouchers
            .find(id)
            .await?
            .ok_or(FiscalError::VoucherNotFound(id))
    }

    fn wsfe_url(&self, environment: AfipEnvironment) -> String {
        self.config.wsfe_url_for(environment)
    }

    /// Returns a valid session for the company, logging in only when needed.
    ///
    /// # Errors
    ///
    /// Returns `FiscalError::Auth` on failure.
    pub async fn acquire_session(&self, company_id: CompanyId) -> Result<SessionTicket, FiscalError> {
        Ok(self.authenticator.acquire(company_id).await?)
    }

    /// Drops the session if the authority stopped accepting it.
    async fn on_protocol_error(&self, company_id: CompanyId, err: &ProtocolError) {
        if err.is_session_failure() {
            warn!(%company_id, error = %err, "Session refused by the authority");
            if let Err(e) = self.authenticator.invalidate(company_id).await {
                warn!(%company_id, error = %e, "Could not invalidate session");
            }
        }
    }

    /// The authority's last authorized number for a sales point and type.
    ///
    /// # Errors
    ///
    /// Returns `Auth` or `Protocol` errors.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn last_authorized_number(
        &self,
        company_id: CompanyId,
        sales_point: u16,
        voucher_type: VoucherType,
    ) -> Result<u64, FiscalError> {
        let type_code = voucher_type
            .code()
            .ok_or_else(|| VoucherError::UnknownVoucherType(voucher_type.to_string()))?;
        let credential = self.credential(company_id).await?;
        let ticket = self.acquire_session(company_id).await?;
        let auth = WsfeAuth {
            ticket: &ticket,
            cuit: &credential.cuit,
        };
        match self
            .wsfe
            .last_authorized_number(&self.wsfe_url(credential.environment), &auth, sales_point, type_code)
            .await
        {
            Ok(number) => Ok(number),
            Err(e) => {
                self.on_protocol_error(company_id, &e).await;
                Err(e.into())
            }
        }
    }

    /// Remote last number, or `None` when the authority cannot be reached.
    async fn remote_last(&self, key: &SequenceKey) -> Result<Option<u64>, FiscalError> {
        match self
            .last_authorized_number(key.company_id, key.sales_point, key.voucher_type)
            .await
        {
            Ok(number) => Ok(Some(number)),
            Err(e) if e.is_retryable() => {
                warn!(sequence = %key, error = %e, "Remote number unavailable, using local sources");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn reserve(&self, key: SequenceKey) -> Result<Reservation, FiscalError> {
        let remote_last = self.remote_last(&key).await?;
        let reservation = self.vouchers.reserve_number(key, remote_last).await?;
        info!(
            sequence = %key,
            number = reservation.number,
            source = ?reservation.sources.dominant(),
            "Reserved voucher number"
        );
        Ok(reservation)
    }

    /// Reserves the next voucher number for a sales point and type.
    ///
    /// Concurrent calls for the same sequence get contiguous, distinct numbers.
    /// The number is a forecast: authorization always submits the number the
    /// authority expects and pulls the counter back to it.
    ///
    /// # Errors
    ///
    /// Returns `Voucher` errors for invalid keys, `Store` errors, and
    /// non-transient `Auth`/`Protocol` errors from the remote query.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn next_voucher_number(
        &self,
        company_id: CompanyId,
        sales_point: u32,
        voucher_type: VoucherType,
    ) -> Result<Reservation, FiscalError> {
        let key = SequenceKey::new(company_id, sales_point, voucher_type)?;
        let lock = lock_for(&self.sequence_locks, key);
        let _guard = lock.lock().await;
        self.reserve(key).await
    }

    async fn release(&self, key: SequenceKey, number: u64) {
        match self.vouchers.release_number(key, number).await {
            Ok(true) => info!(sequence = %key, number, "Released voucher number"),
            Ok(false) => {}
            Err(e) => warn!(sequence = %key, number, error = %e, "Could not release voucher number"),
        }
    }

    async fn clear_pending(&self, voucher_id: VoucherId, number: u64) {
        if let Err(e) = self.vouchers.clear_pending(voucher_id).await {
            warn!(voucher_id = %voucher_id, number, error = %e, "Could not clear pending number");
        }
    }

    /// Gives back a claim the authority certainly did not record.
    async fn abandon(&self, voucher_id: VoucherId, reservation: &Reservation) {
        self.release(reservation.key, reservation.number).await;
        self.clear_pending(voucher_id, reservation.number).await;
    }

    /// Claims the number the authority expects next and marks it pending.
    async fn claim(&self, voucher: &Voucher, key: SequenceKey) -> Result<Reservation, FiscalError> {
        let remote_last = self.remote_last(&key).await?;
        let reservation = self
            .vouchers
            .claim_number(voucher.id, key, remote_last)
            .await?;
        info!(
            sequence = %key,
            voucher_id = %voucher.id,
            number = reservation.number,
            source = ?reservation.sources.dominant(),
            "Claimed voucher number"
        );
        Ok(reservation)
    }

    /// Loads the authorized original a note refers to.
    async fn linked_original(&self, original_id: VoucherId) -> Result<Voucher, FiscalError> {
        let original = self
            .vouchers
            .find(original_id)
            .await?
            .ok_or(BalanceError::LinkedVoucherMissing(original_id))?;
        if !original.is_authorized() {
            return Err(VoucherError::LinkedVoucherNotAuthorized(original_id).into());
        }
        Ok(original)
    }

    /// Checks a credit note fits the original's available balance.
    async fn ensure_credit(
        &self,
        note: &Voucher,
        original: &Voucher,
        view: BalanceView,
    ) -> Result<(), FiscalError> {
        if note.voucher_type.kind == VoucherKind::CreditNote {
            let snapshot = self.snapshot(original).await?;
            BalanceLedger::ensure_credit_fits(note.total(), &snapshot, view)?;
        }
        Ok(())
    }

    async fn snapshot(&self, original: &Voucher) -> Result<BalanceSnapshot, FiscalError> {
        let notes = self.vouchers.linked_notes(original.id).await?;
        let settlements = self.vouchers.confirmed_settlements(original.id).await?;
        Ok(BalanceLedger::recompute(original, &notes, &settlements)?)
    }

    /// Requests the authorization code for a draft voucher.
    ///
    /// A voucher carrying a pending number from an earlier attempt is first
    /// looked up at the authority; if it was recorded, its CAE is adopted
    /// and nothing is submitted. Credit notes are checked against the
    /// original's available balance under `view` before any submission,
    /// holding the original's balance lock until its balance is recomputed.
    ///
    /// # Errors
    ///
    /// - `Voucher` / `Balance` for invariant violations, before any submission
    /// - `Auth` when no session can be obtained
    /// - `Protocol` for rejections, observations and lost responses
    /// - `Store` when persisting fails
    #[instrument(skip(self), fields(voucher_id = %voucher_id))]
    pub async fn authorize_voucher(
        &self,
        voucher_id: VoucherId,
        view: BalanceView,
    ) -> Result<AuthorizationOutcome, FiscalError> {
        let voucher = self.voucher(voucher_id).await?;
        voucher.validate_for_authorization()?;

        let linked_id = voucher
            .linked_voucher_id
            .filter(|_| voucher.voucher_type.is_note());
        let balance_lock = linked_id.map(|id| lock_for(&self.balance_locks, id));
        let _balance_guard = match &balance_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let original = match linked_id {
            Some(id) => Some(self.linked_original(id).await?),
            None => None,
        };
        let _balance_row = match &original {
            Some(original) => Some(self.vouchers.lock_balance(original.id).await?),
            None => None,
        };

        let credential = self.credential(voucher.company_id).await?;
        let linked = original
            .as_ref()
            .map(|o| o.as_linked_ref(&credential.cuit))
            .transpose()?;

        let key = SequenceKey::new(
            voucher.company_id,
            u32::from(voucher.sales_point),
            voucher.voucher_type,
        )?;
        let sequence_lock = lock_for(&self.sequence_locks, key);
        let sequence_guard = sequence_lock.lock().await;

        let resolved = match voucher.pending_number {
            Some(number) => self.resolve_pending(&voucher, &credential, key, number).await?,
            None => None,
        };
        let outcome = match resolved {
            Some(adopted) => Ok((adopted, Vec::new(), true)),
            None => {
                if let Some(original) = &original {
                    self.ensure_credit(&voucher, original, view).await?;
                }
                let reservation = self.claim(&voucher, key).await?;
                self.submit(&voucher, &credential, &reservation, linked)
                    .await
            }
        };
        drop(sequence_guard);

        let (authorized, observations, recovered) = outcome?;

        let balance = match &original {
            Some(original) => Some(self.recompute_locked(original.id).await?),
            None if authorized.voucher_type.is_referenceable() => {
                Some(self.recompute_locked(authorized.id).await?)
            }
            None => None,
        };

        Ok(AuthorizationOutcome {
            voucher: authorized,
            observations,
            recovered,
            balance,
        })
    }

    /// Settles a pending number left by an earlier attempt.
    ///
    /// Returns the voucher if the authority recorded it, `None` once the
    /// number is known to be free of it. Errors keep the number pending.
    async fn resolve_pending(
        &self,
        voucher: &Voucher,
        credential: &Credential,
        key: SequenceKey,
        number: u64,
    ) -> Result<Option<Voucher>, FiscalError> {
        info!(voucher_id = %voucher.id, number, "Checking pending number before submitting");
        let ticket = self.acquire_session(voucher.company_id).await?;
        let auth = WsfeAuth {
            ticket: &ticket,
            cuit: &credential.cuit,
        };
        let endpoint = self.wsfe_url(credential.environment);

        match self.lookup(voucher, &endpoint, &auth, key, number).await? {
            Recorded::Adopted(authorized) => Ok(Some(authorized)),
            Recorded::Absent { remote_last } => {
                if remote_last < number {
                    self.release(key, number).await;
                }
                self.clear_pending(voucher.id, number).await;
                Ok(None)
            }
        }
    }

    async fn submit(
        &self,
        voucher: &Voucher,
        credential: &Credential,
        reservation: &Reservation,
        linked: Option<LinkedVoucherRef>,
    ) -> Result<(Voucher, Vec<AuthorityMessage>, bool), FiscalError> {
        let number = reservation.number;
        let request = match AuthorizationRequest::from_voucher(voucher, number, linked) {
            Ok(request) => request,
            Err(e) => {
                self.abandon(voucher.id, reservation).await;
                return Err(e.into());
            }
        };

        let ticket = match self.acquire_session(voucher.company_id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                self.abandon(voucher.id, reservation).await;
                return Err(e);
            }
        };
        let auth = WsfeAuth {
            ticket: &ticket,
            cuit: &credential.cuit,
        };
        let endpoint = self.wsfe_url(credential.environment);

        info!(
            company_id = %voucher.company_id,
            sales_point = voucher.sales_point,
            voucher_type = request.voucher_type,
            number,
            "Requesting authorization"
        );

        match self.wsfe.authorize(&endpoint, &auth, &request).await {
            Ok(result) => {
                let authorized = self.persist(voucher, number, &result).await?;
                Ok((authorized, result.observations, false))
            }
            Err(e) if e.kind == ProtocolErrorKind::Transient => {
                warn!(
                    company_id = %voucher.company_id,
                    voucher_id = %voucher.id,
                    number,
                    error = %e,
                    "Authorization outcome unknown, re-querying"
                );
                self.recover(voucher, &endpoint, &auth, reservation, e).await
            }
            Err(e) => {
                warn!(
                    company_id = %voucher.company_id,
                    voucher_id = %voucher.id,
                    number,
                    kind = ?e.kind,
                    details = %e.message,
                    "Authorization refused"
                );
                self.on_protocol_error(voucher.company_id, &e).await;
                self.abandon(voucher.id, reservation).await;
                Err(e.into())
            }
        }
    }

    /// Resolves a lost response by asking the authority what it recorded.
    ///
    /// When that cannot be verified the number stays pending on the voucher
    /// and the next attempt looks it up before submitting again.
    async fn recover(
        &self,
        voucher: &Voucher,
        endpoint: &str,
        auth: &WsfeAuth<'_>,
        reservation: &Reservation,
        cause: ProtocolError,
    ) -> Result<(Voucher, Vec<AuthorityMessage>, bool), FiscalError> {
        let number = reservation.number;
        match self
            .lookup(voucher, endpoint, auth, reservation.key, number)
            .await
        {
            Ok(Recorded::Adopted(authorized)) => {
                info!(number, "Recovered authorization after lost response");
                Ok((authorized, Vec::new(), true))
            }
            Ok(Recorded::Absent { remote_last }) => {
                if remote_last < number {
                    self.release(reservation.key, number).await;
                }
                self.clear_pending(voucher.id, number).await;
                Err(cause.into())
            }
            Err(e) => {
                error!(
                    company_id = %voucher.company_id,
                    voucher_id = %voucher.id,
                    sales_point = voucher.sales_point,
                    voucher_type = reservation.key.type_code(),
                    number,
                    error = %e,
                    "Cannot verify authorization outcome; number kept pending on the voucher"
                );
                Err(cause.into())
            }
        }
    }

    /// Asks the authority whether `number` holds this voucher and adopts
    /// its authorization if so.
    async fn lookup(
        &self,
        voucher: &Voucher,
        endpoint: &str,
        auth: &WsfeAuth<'_>,
        key: SequenceKey,
        number: u64,
    ) -> Result<Recorded, FiscalError> {
        let sales_point = key.sales_point;
        let type_code = key.type_code();

        let remote_last = match self
            .wsfe
            .last_authorized_number(endpoint, auth, sales_point, type_code)
            .await
        {
            Ok(last) => last,
            Err(e) => {
                self.on_protocol_error(voucher.company_id, &e).await;
                return Err(e.into());
            }
        };
        if remote_last < number {
            info!(number, remote_last, "Authority did not record the voucher");
            return Ok(Recorded::Absent { remote_last });
        }

        let found = match self
            .wsfe
            .consult(endpoint, auth, sales_point, type_code, number)
            .await
        {
            Ok(Some(found)) => found,
            Ok(None) => {
                warn!(voucher_id = %voucher.id, number, remote_last, "Authority has no voucher under the number");
                return Ok(Recorded::Absent { remote_last });
            }
            Err(e) => {
                self.on_protocol_error(voucher.company_id, &e).await;
                return Err(e.into());
            }
        };

        if found.total.is_some_and(|t| t != voucher.total()) {
            warn!(
                voucher_id = %voucher.id,
                number,
                remote_total = ?found.total,
                total = %voucher.total(),
                "Number holds a different voucher at the authority"
            );
            return Ok(Recorded::Absent { remote_last });
        }

        let authorization = Authorization {
            code: found.code,
            expires_on: found.expires_on,
            authorized_at: Utc::now(),
        };
        match self
            .vouchers
            .record_authorization(voucher.id, number, &authorization)
            .await
        {
            Ok(authorized) => {
                info!(voucher_id = %voucher.id, number, code = %authorization.code, "Adopted recorded authorization");
                Ok(Recorded::Adopted(authorized))
            }
            Err(StoreError::Conflict(detail)) => {
                warn!(voucher_id = %voucher.id, number, %detail, "Number belongs to another local voucher");
                Ok(Recorded::Absent { remote_last })
            }
            Err(e) => {
                error!(
                    company_id = %voucher.company_id,
                    voucher_id = %voucher.id,
                    number,
                    code = %authorization.code,
                    expires_on = %authorization.expires_on,
                    error = %e,
                    "Authorized remotely but not recorded locally"
                );
                Err(e.into())
            }
        }
    }

    async fn persist(
        &self,
        voucher: &Voucher,
        number: u64,
        result: &AuthorizationResult,
    ) -> Result<Voucher, FiscalError> {
        let authorization = Authorization {
            code: result.code.clone(),
            expires_on: result.expires_on,
            authorized_at: Utc::now(),
        };
        match self
            .vouchers
            .record_authorization(voucher.id, number, &authorization)
            .await
        {
            Ok(authorized) => {
                info!(
                    voucher_id = %voucher.id,
                    number,
                    code = %authorization.code,
                    expires_on = %authorization.expires_on,
                    "Voucher authorized"
                );
                Ok(authorized)
            }
            Err(e) => {
                error!(
                    company_id = %voucher.company_id,
                    voucher_id = %voucher.id,
                    sales_point = voucher.sales_point,
                    number,
                    code = %authorization.code,
                    expires_on = %authorization.expires_on,
                    error = %e,
                    "Authorized remotely but not recorded locally"
                );
                Err(e.into())
            }
        }
    }

    async fn recompute_locked(&self, voucher_id: VoucherId) -> Result<BalanceSnapshot, FiscalError> {
        let original = self.voucher(voucher_id).await?;
        let snapshot = self.snapshot(&original).await?;
        self.vouchers.save_balance(&snapshot).await?;
        info!(
            voucher_id = %voucher_id,
            balance_pending = %snapshot.balance_pending,
            status = %snapshot.status,
            "Balance recomputed"
        );
        Ok(snapshot)
    }

    /// Recomputes and persists the balance of a voucher referenced by notes.
    ///
    /// Idempotent; call after any linked note is authorized or annulled.
    ///
    /// # Errors
    ///
    /// Returns `VoucherNotFound`, `Balance` errors for vouchers notes cannot
    /// reference, or `Store` errors.
    #[instrument(skip(self), fields(voucher_id = %voucher_id))]
    pub async fn recompute_balance(&self, voucher_id: VoucherId) -> Result<BalanceSnapshot, FiscalError> {
        let lock = lock_for(&self.balance_locks, voucher_id);
        let _guard = lock.lock().await;
        let _row = match self.vouchers.lock_balance(voucher_id).await {
            Ok(row) => row,
            Err(StoreError::NotFound(_)) => return Err(FiscalError::VoucherNotFound(voucher_id)),
            Err(e) => return Err(e.into()),
        };
        self.recompute_locked(voucher_id).await
    }

    /// Balance available for new credit notes under `view`.
    ///
    /// # Errors
    ///
    /// Same as [`FiscalService::recompute_balance`], without persisting.
    pub async fn available_balance(
        &self,
        voucher_id: VoucherId,
        view: BalanceView,
    ) -> Result<Decimal, FiscalError> {
        let original = self.voucher(voucher_id).await?;
        Ok(self.snapshot(&original).await?.available(view))
    }

    /// Generates a key pair and signing request, keeping the sealed key pending.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if generation fails, `Store` if saving fails.
    #[instrument(skip(self, identity), fields(company_id = %company_id, cuit = %identity.cuit))]
    pub async fn generate_request(
        &self,
        company_id: CompanyId,
        identity: &CompanyIdentity,
    ) -> Result<CertificateRequest, FiscalError> {
        let request = self.certificates.generate_request(identity)?;
        self.credentials
            .save_pending_key(company_id, &request.sealed_key)
            .await?;
        Ok(request)
    }

    /// Validates and installs a certificate.
    ///
    /// Uses `provided_key` if given, otherwise the key pending from
    /// [`FiscalService::generate_request`]. Nothing is saved unless every
    /// check passes.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the failed check, or `Store` errors.
    #[instrument(skip(self, identity, certificate_pem, provided_key), fields(company_id = %company_id))]
    pub async fn install(
        &self,
        company_id: CompanyId,
        identity: &CompanyIdentity,
        certificate_pem: &str,
        provided_key: Option<KeySource>,
        environment: AfipEnvironment,
    ) -> Result<Credential, FiscalError> {
        let key = match provided_key {
            Some(key) => key,
            None => KeySource::Pending(
                self.credentials
                    .pending_key(company_id)
                    .await?
                    .ok_or_else(|| {
                        ValidationError::KeyUnavailable("no pending signing request".to_string())
                    })?,
            ),
        };

        let credential = self.certificates.install(
            company_id,
            identity,
            certificate_pem,
            key,
            environment,
            Utc::now(),
        )?;
        self.credentials.save_credential(&credential).await?;
        info!(not_after = %credential.certificate_not_after, "Certificate installed");
        Ok(credential)
    }

    /// Expiry status of the company's certificate.
    ///
    /// # Errors
    ///
    /// Returns `Auth(MissingCredential)` if none is installed.
    pub async fn certificate_status(
        &self,
        company_id: CompanyId,
    ) -> Result<CertificateStatus, FiscalError> {
        let credential = self.credential(company_id).await?;
        let status = self.certificates.expiry_status(&credential, Utc::now());
        if !matches!(status, CertificateStatus::Valid { .. }) {
            warn!(%company_id, ?status, "Certificate needs renewal");
        }
        Ok(status)
    }

    /// Checks the invoicing service's servers.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` errors.
    pub async fn health_check(&self, environment: AfipEnvironment) -> Result<ServerStatus, FiscalError> {
        Ok(self.wsfe.dummy(&self.wsfe_url(environment)).await?)
    }
}
