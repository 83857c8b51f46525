//! `FECAESolicitar` request model and rendering.

use chrono::NaiveDate;
use facturo_core::voucher::{LinkedVoucherRef, TributeLine, VatLine, Voucher, VoucherError};
use facturo_shared::types::money::format_fixed;
use rust_decimal::Decimal;

use super::category::encoder_for;
use crate::xml::{XmlError, XmlWriter};

/// Date format the authority uses everywhere.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Formats a date as `yyyymmdd`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a `yyyymmdd` date.
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// An `Opcionales/Opcional` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalField {
    /// Field id.
    pub id: String,
    /// Field value.
    pub value: String,
}

impl OptionalField {
    /// Creates an entry.
    #[must_use]
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// A single-voucher authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Sales point.
    pub sales_point: u16,
    /// Voucher type code.
    pub voucher_type: u16,
    /// Reserved number, sent as both `CbteDesde` and `CbteHasta`.
    pub number: u64,
    /// Concept code.
    pub concept: u8,
    /// Counterparty document type code.
    pub document_type: u16,
    /// Counterparty document number.
    pub document_number: u64,
    /// Issue date.
    pub issue_date: NaiveDate,
    /// `ImpTotal`.
    pub total: Decimal,
    /// `ImpTotConc`.
    pub untaxed: Decimal,
    /// `ImpNeto`.
    pub net: Decimal,
    /// `ImpOpEx`.
    pub exempt: Decimal,
    /// `ImpTrib`.
    pub tributes_total: Decimal,
    /// `ImpIVA`.
    pub vat_total: Decimal,
    /// Service period start.
    pub service_from: Option<NaiveDate>,
    /// Service period end.
    pub service_to: Option<NaiveDate>,
    /// Payment due date.
    pub payment_due_date: Option<NaiveDate>,
    /// Currency code.
    pub currency: String,
    /// Exchange rate to pesos.
    pub exchange_rate: Decimal,
    /// Original voucher, for notes.
    pub linked: Option<LinkedVoucherRef>,
    /// Tribute lines.
    pub tributes: Vec<TributeLine>,
    /// VAT buckets.
    pub vat_lines: Vec<VatLine>,
    /// Optional fields.
    pub optionals: Vec<OptionalField>,
}

impl AuthorizationRequest {
    /// Builds the request for `voucher` with a reserved `number`.
    ///
    /// # Errors
    ///
    /// Returns an error if the voucher type has no code, or a note has no
    /// linked reference.
    pub fn from_voucher(
        voucher: &Voucher,
        number: u64,
        linked: Option<LinkedVoucherRef>,
    ) -> Result<Self, VoucherError> {
        if number == 0 {
            return Err(VoucherError::InvalidNumber);
        }
        if voucher.voucher_type.is_note() && linked.is_none() {
            return Err(VoucherError::MissingLinkedVoucher);
        }

        let amounts = &voucher.amounts;
        let period = voucher
            .service_period
            .filter(|_| voucher.concept.requires_service_period());

        let mut request = Self {
            sales_point: voucher.sales_point,
            voucher_type: voucher.type_code()?,
            number,
            concept: voucher.concept.code(),
            document_type: voucher.counterparty.document_type.code(),
            document_number: voucher.counterparty.document_number,
            issue_date: voucher.issue_date,
            total: amounts.total,
            untaxed: amounts.untaxed_amount,
            net: amounts.net_amount,
            exempt: amounts.exempt_amount,
            tributes_total: amounts.other_charges_amount,
            vat_total: amounts.tax_amount,
            service_from: period.map(|p| p.from),
            service_to: period.map(|p| p.to),
            payment_due_date: period.map(|p| p.payment_due),
            currency: voucher.currency.afip_code().to_string(),
            exchange_rate: voucher.exchange_rate,
            linked,
            tributes: amounts.tributes.clone(),
            vat_lines: amounts.vat_lines.clone(),
            optionals: Vec::new(),
        };

        encoder_for(&voucher.category).encode(&mut request);
        Ok(request)
    }

    /// Writes the `FeCAEReq` element.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write(&self, w: &mut XmlWriter) -> Result<(), XmlError> {
        w.open("ar:FeCAEReq")?;
        w.open("ar:FeCabReq")?;
        w.leaf("ar:CantReg", "1")?;
        w.leaf("ar:PtoVta", self.sales_point.to_string())?;
        w.leaf("ar:CbteTipo", self.voucher_type.to_string())?;
        w.close("ar:FeCabReq")?;

        w.open("ar:FeDetReq")?;
        w.open("ar:FECAEDetRequest")?;
        w.leaf("ar:Concepto", self.concept.to_string())?;
        w.leaf("ar:DocTipo", self.document_type.to_string())?;
        w.leaf("ar:DocNro", self.document_number.to_string())?;
        w.leaf("ar:CbteDesde", self.number.to_string())?;
        w.leaf("ar:CbteHasta", self.number.to_string())?;
        w.leaf("ar:CbteFch", format_date(self.issue_date))?;
        w.leaf("ar:ImpTotal", format_fixed(self.total))?;
        w.leaf("ar:ImpTotConc", format_fixed(self.untaxed))?;
        w.leaf("ar:ImpNeto", format_fixed(self.net))?;
        w.leaf("ar:ImpOpEx", format_fixed(self.exempt))?;
        w.leaf("ar:ImpTrib", format_fixed(self.tributes_total))?;
        w.leaf("ar:ImpIVA", format_fixed(self.vat_total))?;
        if let Some(from) = self.service_from {
            w.leaf("ar:FchServDesde", format_date(from))?;
        }
        if let Some(to) = self.service_to {
            w.leaf("ar:FchServHasta", format_date(to))?;
        }
        if let Some(due) = self.payment_due_date {
            w.leaf("ar:FchVtoPago", format_date(due))?;
        }
        w.leaf("ar:MonId", &self.currency)?;
        w.leaf("ar:MonCotiz", format_rate(self.exchange_rate))?;

        if let Some(linked) = &self.linked {
            w.open("ar:CbtesAsoc")?;
            w.open("ar:CbteAsoc")?;
            w.leaf("ar:Tipo", linked.voucher_type.code().unwrap_or_default().to_string())?;
            w.leaf("ar:PtoVta", linked.sales_point.to_string())?;
            w.leaf("ar:Nro", linked.number.to_string())?;
            w.leaf("ar:Cuit", linked.issuer_cuit.digits())?;
            w.leaf("ar:CbteFch", format_date(linked.issue_date))?;
            w.close("ar:CbteAsoc")?;
            w.close("ar:CbtesAsoc")?;
        }

        if !self.tributes.is_empty() {
            w.open("ar:Tributos")?;
            for tribute in &self.tributes {
                w.open("ar:Tributo")?;
                w.leaf("ar:Id", tribute.tribute_id.to_string())?;
                w.leaf("ar:Desc", &tribute.description)?;
                w.leaf("ar:BaseImp", format_fixed(tribute.base))?;
                w.leaf("ar:Alic", format_fixed(tribute.rate))?;
                w.leaf("ar:Importe", format_fixed(tribute.amount))?;
                w.close("ar:Tributo")?;
            }
            w.close("ar:Tributos")?;
        }

        if !self.vat_lines.is_empty() {
            w.open("ar:Iva")?;
            for line in &self.vat_lines {
                w.open("ar:AlicIva")?;
                w.leaf("ar:Id", line.rate.id().to_string())?;
                w.leaf("ar:BaseImp", format_fixed(line.base))?;
                w.leaf("ar:Importe", format_fixed(line.amount))?;
                w.close("ar:AlicIva")?;
            }
            w.close("ar:Iva")?;
        }

        if !self.optionals.is_empty() {
            w.open("ar:Opcionales")?;
            for optional in &self.optionals {
                w.open("ar:Opcional")?;
                w.leaf("ar:Id", &optional.id)?;
                w.leaf("ar:Valor", &optional.value)?;
                w.close("ar:Opcional")?;
            }
            w.close("ar:Opcionales")?;
        }

        w.close("ar:FECAEDetRequest")?;
        w.close("ar:FeDetReq")?;
        w.close("ar:FeCAEReq")
    }
}

fn format_rate(rate: Decimal) -> String {
    rate.round_dp(6).normalize().to_string()
}
