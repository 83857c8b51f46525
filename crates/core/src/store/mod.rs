//! Persistence seams.
//!
//! The fiscal service talks to storage only through these traits.
//! `facturo-db` implements them over Postgres; [`MemoryStore`] keeps
//! everything in process.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use facturo_shared::types::{CompanyId, VoucherId};
use thiserror::Error;

use crate::balance::{BalanceSnapshot, Settlement};
use crate::credential::{Credential, SessionBlock, SessionTicket};
use crate::sequence::{Reservation, SequenceKey};
use crate::voucher::{Authorization, Voucher};

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness or state rule would be broken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backend failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Returns true if the operation may succeed when retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Exclusive hold on one voucher's balance, released on drop.
///
/// Serializes note authorization against an original across processes.
pub struct BalanceLock {
    _held: Box<dyn Send + Sync>,
}

impl BalanceLock {
    /// Wraps whatever keeps the lock alive.
    pub fn new(held: impl Send + Sync + 'static) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl std::fmt::Debug for BalanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceLock").finish_non_exhaustive()
    }
}

/// Credential persistence. One credential per company.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the company's credential.
    async fn find_by_company(&self, company_id: CompanyId)
    -> Result<Option<Credential>, StoreError>;

    /// Inserts or replaces the company's credential and drops its pending key.
    async fn save_credential(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Replaces the cached session and clears any session block, atomically.
    async fn save_session(
        &self,
        company_id: CompanyId,
        ticket: &SessionTicket,
    ) -> Result<(), StoreError>;

    /// Records a scheduled retry after an "already active" answer.
    async fn save_session_block(
        &self,
        company_id: CompanyId,
        block: &SessionBlock,
    ) -> Result<(), StoreError>;

    /// Drops the cached session.
    async fn clear_session(&self, company_id: CompanyId) -> Result<(), StoreError>;

    /// Stores the sealed key of a pending signing request, replacing any previous one.
    async fn save_pending_key(
        &self,
        company_id: CompanyId,
        sealed_key: &str,
    ) -> Result<(), StoreError>;

    /// Loads the sealed key of the pending signing request.
    async fn pending_key(&self, company_id: CompanyId) -> Result<Option<String>, StoreError>;
}

/// Voucher, counter and settlement persistence.
#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// Loads a voucher.
    async fn find(&self, id: VoucherId) -> Result<Option<Voucher>, StoreError>;

    /// Stores a new draft voucher.
    async fn insert(&self, voucher: &Voucher) -> Result<(), StoreError>;

    /// Notes linked to `original`, in any status.
    async fn linked_notes(&self, original: VoucherId) -> Result<Vec<Voucher>, StoreError>;

    /// Confirmed settlements of a voucher.
    async fn confirmed_settlements(&self, voucher: VoucherId)
    -> Result<Vec<Settlement>, StoreError>;

    /// Reserves the next number for `key`.
    ///
    /// Reads the highest local number and the counter, picks
    /// `max(remote_last, local, counter) + 1` and advances the counter, all
    /// under one lock so concurrent callers get distinct numbers.
    async fn reserve_number(
        &self,
        key: SequenceKey,
        remote_last: Option<u64>,
    ) -> Result<Reservation, StoreError>;

    /// Claims the number an authorization request for `voucher` will carry.
    ///
    /// Picks `remote_last + 1` (or the next local number when the authority
    /// is unknown), moves the counter to it and marks it pending on the
    /// voucher, atomically. The mark survives until the outcome is known.
    ///
    /// Fails with `Conflict` if the voucher is authorized, or if a locally
    /// authorized voucher already holds the number.
    async fn claim_number(
        &self,
        voucher: VoucherId,
        key: SequenceKey,
        remote_last: Option<u64>,
    ) -> Result<Reservation, StoreError>;

    /// Drops the pending mark of a voucher.
    async fn clear_pending(&self, voucher: VoucherId) -> Result<(), StoreError>;

    /// Takes the exclusive balance lock of `voucher`, waiting for holders.
    async fn lock_balance(&self, voucher: VoucherId) -> Result<BalanceLock, StoreError>;

    /// Gives `number` back if it is still the last one reserved for `key`.
    ///
    /// Returns true if the counter moved back.
    async fn release_number(&self, key: SequenceKey, number: u64) -> Result<bool, StoreError>;

    /// Sets number and authorization on a draft.
    ///
    /// Fails with `Conflict` if the voucher is already authorized or the
    /// number is taken in its sequence.
    async fn record_authorization(
        &self,
        id: VoucherId,
        number: u64,
        authorization: &Authorization,
    ) -> Result<Voucher, StoreError>;

    /// Persists a recomputed balance.
    async fn save_balance(&self, snapshot: &BalanceSnapshot) -> Result<(), StoreError>;
}
