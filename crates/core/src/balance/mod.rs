//! Balance ledger.
//!
//! Keeps the outstanding amount of an invoice consistent as credit and debit
//! notes are authorized against it, and drives its balance state:
//! Open → PartiallyAdjusted → Cancelled.

pub mod error;
pub mod ledger;
pub mod types;

#[cfg(test)]
mod ledger_props;

pub use error::BalanceError;
pub use ledger::BalanceLedger;
pub use types::{
    BalanceAdjustment, BalanceSnapshot, BalanceStatus, BalanceView, LinkedNote, NoteDirection,
    Settlement,
};
