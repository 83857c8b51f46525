//! Voucher invariant errors.
//!
//! All of these are detected before any network call.

use facturo_shared::types::VoucherId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised when a voucher breaks a fiscal invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherError {
    /// The voucher already carries an authorization code.
    #[error("Voucher {0} is already authorized")]
    AlreadyAuthorized(VoucherId),

    /// The voucher was annulled and cannot be authorized.
    #[error("Voucher {0} is annulled")]
    Annulled(VoucherId),

    /// The number is already used for this company, type and sales point.
    #[error("Voucher number {number} already used for type {voucher_type} at sales point {sales_point}")]
    DuplicateNumber {
        /// Authority code of the voucher type.
        voucher_type: u16,
        /// Sales point.
        sales_point: u16,
        /// The duplicated number.
        number: u64,
    },

    /// Sales point outside 1..=9999.
    #[error("Sales point must be between 1 and 9999, got {0}")]
    InvalidSalesPoint(u32),

    /// Voucher numbers start at 1.
    #[error("Voucher number must be positive")]
    InvalidNumber,

    /// Kind/letter combination the authority does not define.
    #[error("Unknown voucher type: {0}")]
    UnknownVoucherType(String),

    /// An amount that must be non-negative is negative.
    #[error("Amount '{0}' cannot be negative")]
    NegativeAmount(&'static str),

    /// A computed figure does not match the declared one.
    #[error("Amount mismatch on '{field}': declared {declared}, computed {computed}")]
    AmountMismatch {
        /// Which figure disagrees.
        field: &'static str,
        /// The value on the voucher.
        declared: Decimal,
        /// The value computed from its lines.
        computed: Decimal,
    },

    /// The voucher total must be positive.
    #[error("Voucher total must be positive")]
    ZeroTotal,

    /// Letter C vouchers cannot discriminate VAT.
    #[error("Letter C vouchers cannot carry VAT lines")]
    VatNotAllowed,

    /// Category does not fit the voucher type.
    #[error("Category mismatch: {0}")]
    CategoryMismatch(String),

    /// Bank account identifier (CBU) must have 22 digits.
    #[error("Invalid CBU: {0}")]
    InvalidCbu(String),

    /// Services require a service period.
    #[error("Service vouchers require a service period")]
    MissingServicePeriod,

    /// A credit or debit note without its original voucher.
    #[error("Notes must reference an original voucher")]
    MissingLinkedVoucher,

    /// The referenced original voucher has no authorization code.
    #[error("Linked voucher {0} is not authorized")]
    LinkedVoucherNotAuthorized(VoucherId),

    /// Foreign currency vouchers need a positive exchange rate.
    #[error("Exchange rate must be positive")]
    InvalidExchangeRate,
}

impl VoucherError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyAuthorized(_) => "VOUCHER_ALREADY_AUTHORIZED",
            Self::Annulled(_) => "VOUCHER_ANNULLED",
            Self::DuplicateNumber { .. } => "DUPLICATE_VOUCHER_NUMBER",
            Self::InvalidSalesPoint(_) => "INVALID_SALES_POINT",
            Self::InvalidNumber => "INVALID_VOUCHER_NUMBER",
            Self::UnknownVoucherType(_) => "UNKNOWN_VOUCHER_TYPE",
            Self::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::ZeroTotal => "ZERO_TOTAL",
            Self::VatNotAllowed => "VAT_NOT_ALLOWED",
            Self::CategoryMismatch(_) => "CATEGORY_MISMATCH",
            Self::InvalidCbu(_) => "INVALID_CBU",
            Self::MissingServicePeriod => "MISSING_SERVICE_PERIOD",
            Self::MissingLinkedVoucher => "MISSING_LINKED_VOUCHER",
            Self::LinkedVoucherNotAuthorized(_) => "LINKED_VOUCHER_NOT_AUTHORIZED",
            Self::InvalidExchangeRate => "INVALID_EXCHANGE_RATE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            VoucherError::AlreadyAuthorized(VoucherId::new()).error_code(),
            "VOUCHER_ALREADY_AUTHORIZED"
        );
        assert_eq!(
            VoucherError::DuplicateNumber {
                voucher_type: 1,
                sales_point: 2,
                number: 3
            }
            .error_code(),
            "DUPLICATE_VOUCHER_NUMBER"
        );
        assert_eq!(VoucherError::VatNotAllowed.error_code(), "VAT_NOT_ALLOWED");
    }

    #[test]
    fn test_error_display() {
        let err = VoucherError::AmountMismatch {
            field: "net_amount",
            declared: dec!(100.00),
            computed: dec!(99.99),
        };
        assert_eq!(
            err.to_string(),
            "Amount mismatch on 'net_amount': declared 100.00, computed 99.99"
        );
        assert_eq!(
            VoucherError::InvalidSalesPoint(10_000).to_string(),
            "Sales point must be between 1 and 9999, got 10000"
        );
    }
}
