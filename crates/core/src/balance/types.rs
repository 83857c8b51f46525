//! Balance ledger domain types.

use facturo_shared::types::{SettlementId, VoucherId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::voucher::{Voucher, VoucherKind, VoucherStatus};

/// Balance state of a voucher notes can reference.
///
/// - Open: nothing adjusted downwards, `balance_pending >= total`
/// - PartiallyAdjusted: `0 < balance_pending < total`
/// - Cancelled: `balance_pending` below one cent, stored as exactly zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    /// Initial state after authorization.
    Open,
    /// Some credit notes applied, balance still positive.
    PartiallyAdjusted,
    /// Fully offset by credit notes.
    Cancelled,
}

impl BalanceStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PartiallyAdjusted => "partially_adjusted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "partially_adjusted" => Some(Self::PartiallyAdjusted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which balance figure a caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceView {
    /// Legal balance: total adjusted by authorized notes only.
    Fiscal,
    /// Fiscal balance net of confirmed payments/collections.
    SettlementAware,
}

/// Direction of a note's adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteDirection {
    /// Increases the outstanding amount.
    Debit,
    /// Decreases the outstanding amount.
    Credit,
}

/// A note linked to an original voucher, reduced to what the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedNote {
    /// The note.
    pub voucher_id: VoucherId,
    /// Adjustment direction.
    pub direction: NoteDirection,
    /// Note total.
    pub total: Decimal,
    /// The note carries an authorization code.
    pub authorized: bool,
    /// The note was annulled.
    pub annulled: bool,
}

impl LinkedNote {
    /// Builds the ledger view of a voucher, `None` if it is not a note.
    #[must_use]
    pub fn from_voucher(voucher: &Voucher) -> Option<Self> {
        let direction = match voucher.voucher_type.kind {
            VoucherKind::DebitNote => NoteDirection::Debit,
            VoucherKind::CreditNote => NoteDirection::Credit,
            VoucherKind::Invoice | VoucherKind::Receipt => return None,
        };
        Some(Self {
            voucher_id: voucher.id,
            direction,
            total: voucher.total(),
            authorized: voucher.is_authorized(),
            annulled: voucher.status == VoucherStatus::Annulled,
        })
    }

    /// Counts towards the balance only once authorized and while not annulled.
    #[must_use]
    pub const fn counts(&self) -> bool {
        self.authorized && !self.annulled
    }
}

/// A payment or collection against a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Settlement ID.
    pub id: SettlementId,
    /// Voucher it settles.
    pub voucher_id: VoucherId,
    /// Settled amount.
    pub amount: Decimal,
    /// Only confirmed settlements reduce the settlement-aware balance.
    pub confirmed: bool,
}

/// Signed sum of authorized, non-annulled notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    /// Sum of debit notes.
    pub debits: Decimal,
    /// Sum of credit notes.
    pub credits: Decimal,
}

impl BalanceAdjustment {
    /// Debits minus credits.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.debits - self.credits
    }
}

/// Result of recomputing a voucher's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// The original voucher.
    pub voucher_id: VoucherId,
    /// Its total.
    pub total: Decimal,
    /// Note adjustments applied.
    pub adjustment: BalanceAdjustment,
    /// Fiscal outstanding amount, rounded to cents, zero when cancelled.
    pub balance_pending: Decimal,
    /// Resulting state.
    pub status: BalanceStatus,
    /// Sum of confirmed settlements.
    pub settled: Decimal,
}

impl BalanceSnapshot {
    /// Balance available under the requested view.
    #[must_use]
    pub fn available(&self, view: BalanceView) -> Decimal {
        match view {
            BalanceView::Fiscal => self.balance_pending,
            BalanceView::SettlementAware => self.balance_pending - self.settled,
        }
    }
}
