//! Fiscal vouchers.
//!
//! This module defines the voucher aggregate and its building blocks:
//! - Voucher types and the authority's type codes
//! - Category-specific data (standard vs. MiPyME credit vouchers)
//! - Amount breakdown and its arithmetic rules
//! - Invariant errors detected before any network call

pub mod amounts;
pub mod category;
pub mod error;
pub mod model;
pub mod types;

#[cfg(test)]
mod amounts_props;

pub use amounts::{TributeLine, VatLine, VatRate, VoucherAmounts};
pub use category::{TransferMode, VoucherCategory};
pub use error::VoucherError;
pub use model::{
    Authorization, Concept, Counterparty, DocumentType, LinkedVoucherRef, MAX_SALES_POINT,
    ServicePeriod, Voucher, VoucherStatus, validate_sales_point,
};
pub use types::{Letter, VoucherKind, VoucherType};
