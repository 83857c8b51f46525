//! Voucher categories.
//!
//! Each category carries only the fields its protocol variant needs. The
//! protocol client dispatches on this enum exactly once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::VoucherError;
use super::types::{VoucherKind, VoucherType};

/// How a MiPyME credit invoice is transferred for collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    /// Collection agent system (SCA).
    Sca,
    /// Direct collection (ADC).
    Adc,
}

impl TransferMode {
    /// Value sent to the authority.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sca => "SCA",
            Self::Adc => "ADC",
        }
    }
}

/// Category-specific voucher data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum VoucherCategory {
    /// Standard electronic voucher.
    #[default]
    Standard,
    /// MiPyME electronic credit invoice.
    MipymeInvoice {
        /// Date the buyer must pay by.
        payment_due_date: NaiveDate,
        /// Issuer's 22-digit bank account identifier (CBU).
        cbu: String,
        /// Transfer mode for collection.
        transfer_mode: TransferMode,
    },
    /// MiPyME credit or debit note.
    MipymeNote {
        /// The note annuls the original after the buyer rejected it.
        annulment: bool,
    },
}

impl VoucherCategory {
    /// Checks that the category fits the voucher type.
    ///
    /// # Errors
    ///
    /// Returns an error if a MiPyME type lacks MiPyME data or the other way
    /// around, or if the CBU is malformed.
    pub fn validate_for(&self, voucher_type: &VoucherType) -> Result<(), VoucherError> {
        match (self, voucher_type.mipyme, voucher_type.kind) {
            (Self::Standard, false, _) => Ok(()),
            (Self::MipymeInvoice { cbu, .. }, true, VoucherKind::Invoice) => {
                if cbu.len() == 22 && cbu.chars().all(|c| c.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err(VoucherError::InvalidCbu(cbu.clone()))
                }
            }
            (Self::MipymeNote { .. }, true, VoucherKind::CreditNote | VoucherKind::DebitNote) => {
                Ok(())
            }
            _ => Err(VoucherError::CategoryMismatch(format!(
                "{} cannot carry {} data",
                voucher_type,
                self.name()
            ))),
        }
    }

    /// Short category name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::MipymeInvoice { .. } => "mipyme-invoice",
            Self::MipymeNote { .. } => "mipyme-note",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::types::Letter;

    fn fce_invoice() -> VoucherCategory {
        VoucherCategory::MipymeInvoice {
            payment_due_date: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
            cbu: "2850590940090418135201".to_string(),
            transfer_mode: TransferMode::Sca,
        }
    }

    #[test]
    fn test_standard_fits_standard_types() {
        let invoice = VoucherType::new(VoucherKind::Invoice, Letter::A);
        assert!(VoucherCategory::Standard.validate_for(&invoice).is_ok());
    }

    #[test]
    fn test_mipyme_invoice_requires_mipyme_type() {
        let mipyme = VoucherType::mipyme(VoucherKind::Invoice, Letter::A);
        let standard = VoucherType::new(VoucherKind::Invoice, Letter::A);
        assert!(fce_invoice().validate_for(&mipyme).is_ok());
        assert!(matches!(
            fce_invoice().validate_for(&standard),
            Err(VoucherError::CategoryMismatch(_))
        ));
        assert!(matches!(
            VoucherCategory::Standard.validate_for(&mipyme),
            Err(VoucherError::CategoryMismatch(_))
        ));
    }

    #[test]
    fn test_mipyme_note_requires_note_type() {
        let note = VoucherType::mipyme(VoucherKind::CreditNote, Letter::B);
        let invoice = VoucherType::mipyme(VoucherKind::Invoice, Letter::B);
        let category = VoucherCategory::MipymeNote { annulment: false };
        assert!(category.validate_for(&note).is_ok());
        assert!(category.validate_for(&invoice).is_err());
    }

    #[test]
    fn test_invalid_cbu() {
        let mipyme = VoucherType::mipyme(VoucherKind::Invoice, Letter::A);
        let category = VoucherCategory::MipymeInvoice {
            payment_due_date: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
            cbu: "123".to_string(),
            transfer_mode: TransferMode::Adc,
        };
        assert_eq!(
            category.validate_for(&mipyme),
            Err(VoucherError::InvalidCbu("123".to_string()))
        );
    }
}
