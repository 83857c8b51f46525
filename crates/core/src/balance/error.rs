//! Balance ledger errors.

use facturo_shared::types::VoucherId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the balance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// A credit note would exceed the available balance.
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Credit note total.
        requested: Decimal,
        /// Balance available under the requested view.
        available: Decimal,
    },

    /// Notes cannot be issued against this voucher.
    #[error("Voucher {0} cannot be referenced by notes")]
    NotReferenceable(VoucherId),

    /// The original voucher of a note does not exist.
    #[error("Linked voucher {0} not found")]
    LinkedVoucherMissing(VoucherId),

    /// A note listed for a voucher is linked to a different one.
    #[error("Note {note} is not linked to voucher {voucher}")]
    ForeignNote {
        /// The note.
        note: VoucherId,
        /// The voucher whose balance was being computed.
        voucher: VoucherId,
    },
}

impl BalanceError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::NotReferenceable(_) => "NOT_REFERENCEABLE",
            Self::LinkedVoucherMissing(_) => "LINKED_VOUCHER_MISSING",
            Self::ForeignNote { .. } => "FOREIGN_NOTE",
        }
    }
}
