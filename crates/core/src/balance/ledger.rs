//! Balance ledger for vouchers referenced by credit and debit notes.
//!
//! `balance_pending = total + Σ debit notes − Σ credit notes`, counting only
//! notes that are authorized and not annulled, rounded to cents. Settlements
//! never feed the fiscal balance; they only shape the settlement-aware view.

use facturo_shared::types::money::{CENT, round_cents};
use rust_decimal::Decimal;

use super::error::BalanceError;
use super::types::{
    BalanceAdjustment, BalanceSnapshot, BalanceStatus, BalanceView, LinkedNote, NoteDirection,
    Settlement,
};
use crate::voucher::Voucher;

/// Balance ledger service.
///
/// Pure business logic: callers load the original voucher, its notes and
/// settlements, and persist the returned snapshot.
pub struct BalanceLedger;

impl BalanceLedger {
    /// Sums the notes that count towards the balance.
    #[must_use]
    pub fn adjustment(notes: &[LinkedNote]) -> BalanceAdjustment {
        notes
            .iter()
            .filter(|n| n.counts())
            .fold(BalanceAdjustment::default(), |mut acc, note| {
                match note.direction {
                    NoteDirection::Debit => acc.debits += note.total,
                    NoteDirection::Credit => acc.credits += note.total,
                }
                acc
            })
    }

    /// Classifies a rounded balance against the voucher total.
    #[must_use]
    pub fn classify(balance: Decimal, total: Decimal) -> BalanceStatus {
        if balance < CENT {
            BalanceStatus::Cancelled
        } else if balance < total {
            BalanceStatus::PartiallyAdjusted
        } else {
            BalanceStatus::Open
        }
    }

    /// Recomputes the balance of `original` from its notes and settlements.
    ///
    /// Idempotent: the result depends only on the current set of notes.
    ///
    /// # Errors
    ///
    /// Returns an error if `original` cannot be referenced by notes, or if a
    /// note is linked to a different voucher.
    pub fn recompute(
        original: &Voucher,
        notes: &[Voucher],
        settlements: &[Settlement],
    ) -> Result<BalanceSnapshot, BalanceError> {
        if !original.voucher_type.is_referenceable() {
            return Err(BalanceError::NotReferenceable(original.id));
        }

        let mut linked = Vec::with_capacity(notes.len());
        for note in notes {
            if note.linked_voucher_id != Some(original.id) {
                return Err(BalanceError::ForeignNote {
                    note: note.id,
                    voucher: original.id,
                });
            }
            if let Some(view) = LinkedNote::from_voucher(note) {
                linked.push(view);
            }
        }

        let total = original.total();
        let adjustment = Self::adjustment(&linked);
        let raw = round_cents(total + adjustment.net());
        let status = Self::classify(raw, total);
        let balance_pending = if status == BalanceStatus::Cancelled {
            Decimal::ZERO
        } else {
            raw
        };

        let settled = round_cents(
            settlements
                .iter()
                .filter(|s| s.confirmed && s.voucher_id == original.id)
                .map(|s| s.amount)
                .sum(),
        );

        Ok(BalanceSnapshot {
            voucher_id: original.id,
            total,
            adjustment,
            balance_pending,
            status,
            settled,
        })
    }

    /// Rejects a credit note whose total exceeds the available balance.
    ///
    /// Never clamps: a request over the limit is refused as a whole.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientBalance` if `requested > available`.
    pub fn ensure_credit_fits(
        requested: Decimal,
        snapshot: &BalanceSnapshot,
        view: BalanceView,
    ) -> Result<(), BalanceError> {
        let requested = round_cents(requested);
        let available = round_cents(snapshot.available(view));
        if requested > available {
            return Err(BalanceError::InsufficientBalance {
                requested,
                available,
            });
        }
        Ok(())
    }
}
