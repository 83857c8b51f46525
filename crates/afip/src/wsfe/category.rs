//! Category-specific request fields.
//!
//! Each voucher category contributes its own fields through one encoder.
//! [`encoder_for`] is the only place that matches on the category.

use chrono::NaiveDate;
use facturo_core::voucher::{TransferMode, VoucherCategory};

use super::request::{AuthorizationRequest, OptionalField};

/// Optional field id of the issuer's CBU on MiPyME invoices.
pub const OPTIONAL_CBU: &str = "2101";
/// Optional field id of the transfer mode on MiPyME invoices.
pub const OPTIONAL_TRANSFER_MODE: &str = "27";
/// Optional field id of the annulment flag on MiPyME notes.
pub const OPTIONAL_ANNULMENT: &str = "22";

/// Adds a category's fields to a request.
pub trait CategoryEncoder {
    /// Writes the category's fields into `request`.
    fn encode(&self, request: &mut AuthorizationRequest);
}

/// Standard vouchers add nothing.
pub struct StandardEncoder;

impl CategoryEncoder for StandardEncoder {
    fn encode(&self, _request: &mut AuthorizationRequest) {}
}

/// MiPyME credit invoices carry the payment due date, CBU and transfer mode.
pub struct MipymeInvoiceEncoder<'a> {
    payment_due_date: NaiveDate,
    cbu: &'a str,
    transfer_mode: TransferMode,
}

impl CategoryEncoder for MipymeInvoiceEncoder<'_> {
    fn encode(&self, request: &mut AuthorizationRequest) {
        request.payment_due_date = Some(self.payment_due_date);
        request.optionals.push(OptionalField::new(OPTIONAL_CBU, self.cbu));
        request.optionals.push(OptionalField::new(
            OPTIONAL_TRANSFER_MODE,
            self.transfer_mode.as_str(),
        ));
    }
}

/// MiPyME notes say whether they annul the original.
pub struct MipymeNoteEncoder {
    annulment: bool,
}

impl CategoryEncoder for MipymeNoteEncoder {
    fn encode(&self, request: &mut AuthorizationRequest) {
        let flag = if self.annulment { "S" } else { "N" };
        request.optionals.push(OptionalField::new(OPTIONAL_ANNULMENT, flag));
    }
}

/// Picks the encoder for a category.
#[must_use]
pub fn encoder_for(category: &VoucherCategory) -> Box<dyn CategoryEncoder + '_> {
    match category {
        VoucherCategory::Standard => Box::new(StandardEncoder),
        VoucherCategory::MipymeInvoice {
            payment_due_date,
            cbu,
            transfer_mode,
        } => Box::new(MipymeInvoiceEncoder {
            payment_due_date: *payment_due_date,
            cbu,
            transfer_mode: *transfer_mode,
        }),
        VoucherCategory::MipymeNote { annulment } => Box::new(MipymeNoteEncoder {
            annulment: *annulment,
        }),
    }
}
