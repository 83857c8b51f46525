//! In-process store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use facturo_shared::types::{CompanyId, VoucherId};

use super::{BalanceLock, CredentialStore, StoreError, VoucherStore};
use crate::balance::{BalanceSnapshot, Settlement};
use crate::credential::{Credential, SessionBlock, SessionTicket};
use crate::sequence::{NumberSources, Reservation, SequenceKey};
use crate::voucher::{Authorization, Voucher};

#[derive(Default)]
struct State {
    credentials: HashMap<CompanyId, Credential>,
    pending_keys: HashMap<CompanyId, String>,
    vouchers: HashMap<VoucherId, Voucher>,
    counters: HashMap<SequenceKey, u64>,
    settlements: Vec<Settlement>,
}

impl State {
    fn credential_mut(&mut self, company_id: CompanyId) -> Result<&mut Credential, StoreError> {
        self.credentials
            .get_mut(&company_id)
            .ok_or_else(|| StoreError::NotFound(format!("credential for company {company_id}")))
    }

    fn in_sequence<'a>(&'a self, key: &'a SequenceKey) -> impl Iterator<Item = &'a Voucher> {
        self.vouchers.values().filter(|v| {
            v.company_id == key.company_id
                && v.sales_point == key.sales_point
                && v.voucher_type == key.voucher_type
        })
    }

    fn sources(&self, key: &SequenceKey, remote_last: Option<u64>) -> NumberSources {
        NumberSources {
            remote_last,
            local_last: self.in_sequence(key).filter_map(|v| v.number).max(),
            counter_last: self.counters.get(key).copied(),
            pending_last: self.in_sequence(key).filter_map(|v| v.pending_number).max(),
        }
    }
}

/// Store keeping everything in memory behind one mutex.
///
/// Every operation is atomic. Used for tests and local tooling.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a settlement.
    pub fn add_settlement(&self, settlement: Settlement) {
        self.state().settlements.push(settlement);
    }

    /// Overwrites a voucher as is, bypassing the draft rules.
    pub fn put_voucher(&self, voucher: Voucher) {
        self.state().vouchers.insert(voucher.id, voucher);
    }

    /// Last number handed out by the counter of `key`.
    #[must_use]
    pub fn counter(&self, key: &SequenceKey) -> Option<u64> {
        self.state().counters.get(key).copied()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.state().credentials.get(&company_id).cloned())
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut state = self.state();
        state.pending_keys.remove(&credential.company_id);
        state
            .credentials
            .insert(credential.company_id, credential.clone());
        Ok(())
    }

    async fn save_session(
        &self,
        company_id: CompanyId,
        ticket: &SessionTicket,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let credential = state.credential_mut(company_id)?;
        credential.session = Some(ticket.clone());
        credential.session_block = None;
        Ok(())
    }

    async fn save_session_block(
        &self,
        company_id: CompanyId,
        block: &SessionBlock,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.credential_mut(company_id)?.session_block = Some(*block);
        Ok(())
    }

    async fn clear_session(&self, company_id: CompanyId) -> Result<(), StoreError> {
        let mut state = self.state();
        state.credential_mut(company_id)?.session = None;
        Ok(())
    }

    async fn save_pending_key(
        &self,
        company_id: CompanyId,
        sealed_key: &str,
    ) -> Result<(), StoreError> {
        self.state()
            .pending_keys
            .insert(company_id, sealed_key.to_string());
        Ok(())
    }

    async fn pending_key(&self, company_id: CompanyId) -> Result<Option<String>, StoreError> {
        Ok(self.state().pending_keys.get(&company_id).cloned())
    }
}

#[async_trait]
impl VoucherStore for MemoryStore {
    async fn find(&self, id: VoucherId) -> Result<Option<Voucher>, StoreError> {
        Ok(self.state().vouchers.get(&id).cloned())
    }

    async fn insert(&self, voucher: &Voucher) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.vouchers.contains_key(&voucher.id) {
            return Err(StoreError::Conflict(format!("voucher {} exists", voucher.id)));
        }
        state.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }

    async fn linked_notes(&self, original: VoucherId) -> Result<Vec<Voucher>, StoreError> {
        Ok(self
            .state()
            .vouchers
            .values()
            .filter(|v| v.linked_voucher_id == Some(original))
            .cloned()
            .collect())
    }

    async fn confirmed_settlements(
        &self,
        voucher: VoucherId,
    ) -> Result<Vec<Settlement>, StoreError> {
        Ok(self
            .state()
            .settlements
            .iter()
            .filter(|s| s.voucher_id == voucher && s.confirmed)
            .cloned()
            .collect())
    }

    async fn reserve_number(
        &self,
        key: SequenceKey,
        remote_last: Option<u64>,
    ) -> Result<Reservation, StoreError> {
        let mut state = self.state();
        let reservation = Reservation::from_sources(key, state.sources(&key, remote_last));
        state.counters.insert(key, reservation.number);
        Ok(reservation)
    }

    async fn claim_number(
        &self,
        voucher: VoucherId,
        key: SequenceKey,
        remote_last: Option<u64>,
    ) -> Result<Reservation, StoreError> {
        let mut state = self.state();
        match state.vouchers.get(&voucher) {
            None => return Err(StoreError::NotFound(format!("voucher {voucher}"))),
            Some(v) if v.is_authorized() => {
                return Err(StoreError::Conflict(format!("voucher {voucher} is authorized")));
            }
            Some(_) => {}
        }
        let reservation = Reservation::for_submission(key, state.sources(&key, remote_last))
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        state.counters.insert(key, reservation.number);
        if let Some(v) = state.vouchers.get_mut(&voucher) {
            v.pending_number = Some(reservation.number);
        }
        Ok(reservation)
    }

    async fn clear_pending(&self, voucher: VoucherId) -> Result<(), StoreError> {
        let mut state = self.state();
        let voucher = state
            .vouchers
            .get_mut(&voucher)
            .ok_or_else(|| StoreError::NotFound(format!("voucher {voucher}")))?;
        voucher.pending_number = None;
        Ok(())
    }

    async fn lock_balance(&self, _voucher: VoucherId) -> Result<BalanceLock, StoreError> {
        // One process; the service's in-process locks already serialize.
        Ok(BalanceLock::new(()))
    }

    async fn release_number(&self, key: SequenceKey, number: u64) -> Result<bool, StoreError> {
        let mut state = self.state();
        match state.counters.get_mut(&key) {
            Some(counter) if *counter == number => {
                *counter = number - 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_authorization(
        &self,
        id: VoucherId,
        number: u64,
        authorization: &Authorization,
    ) -> Result<Voucher, StoreError> {
        let mut state = self.state();
        let voucher = state
            .vouchers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("voucher {id}")))?;

        let taken = state.vouchers.values().any(|v| {
            v.id != id
                && v.number == Some(number)
                && v.company_id == voucher.company_id
                && v.sales_point == voucher.sales_point
                && v.voucher_type == voucher.voucher_type
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "number {number} already used in sales point {}",
                voucher.sales_point
            )));
        }

        let mut updated = voucher;
        updated
            .record_authorization(number, authorization.clone())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        state.vouchers.insert(id, updated.clone());
        Ok(updated)
    }

    async fn save_balance(&self, snapshot: &BalanceSnapshot) -> Result<(), StoreError> {
        let mut state = self.state();
        let voucher = state
            .vouchers
            .get_mut(&snapshot.voucher_id)
            .ok_or_else(|| StoreError::NotFound(format!("voucher {}", snapshot.voucher_id)))?;
        voucher.balance_pending = Some(snapshot.balance_pending);
        voucher.balance_status = Some(snapshot.status);
        Ok(())
    }
}
