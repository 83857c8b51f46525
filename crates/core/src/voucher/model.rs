//! The voucher aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use facturo_shared::types::{CompanyId, Currency, Cuit, VoucherId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amounts::VoucherAmounts;
use super::category::VoucherCategory;
use super::error::VoucherError;
use super::types::VoucherType;
use crate::balance::BalanceStatus;

/// Highest sales point the authority accepts.
pub const MAX_SALES_POINT: u16 = 9999;

/// Identification document of the counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Tax identifier of a company or registered individual.
    Cuit,
    /// Labor identifier.
    Cuil,
    /// National identity document.
    Dni,
    /// Passport.
    Passport,
    /// Anonymous final consumer.
    FinalConsumer,
}

impl DocumentType {
    /// The authority's document type code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Cuit => 80,
            Self::Cuil => 86,
            Self::Passport => 94,
            Self::Dni => 96,
            Self::FinalConsumer => 99,
        }
    }
}

/// The customer a voucher is issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Document type.
    pub document_type: DocumentType,
    /// Document number, 0 for anonymous final consumers.
    pub document_number: u64,
    /// Display name.
    pub name: Option<String>,
}

impl Counterparty {
    /// An anonymous final consumer.
    #[must_use]
    pub const fn final_consumer() -> Self {
        Self {
            document_type: DocumentType::FinalConsumer,
            document_number: 0,
            name: None,
        }
    }

    /// A counterparty identified by CUIT.
    #[must_use]
    pub fn with_cuit(cuit: &Cuit, name: impl Into<String>) -> Self {
        Self {
            document_type: DocumentType::Cuit,
            document_number: cuit.as_u64(),
            name: Some(name.into()),
        }
    }
}

/// What the voucher bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    /// Goods.
    Products,
    /// Services.
    Services,
    /// Goods and services.
    ProductsAndServices,
}

impl Concept {
    /// The authority's concept code.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Products => 1,
            Self::Services => 2,
            Self::ProductsAndServices => 3,
        }
    }

    /// Services require a service period.
    #[must_use]
    pub const fn requires_service_period(&self) -> bool {
        !matches!(self, Self::Products)
    }
}

/// Billing period for services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePeriod {
    /// First day of service.
    pub from: NaiveDate,
    /// Last day of service.
    pub to: NaiveDate,
    /// Payment due date.
    pub payment_due: NaiveDate,
}

/// Fiscal lifecycle of a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    /// Not yet authorized.
    Draft,
    /// Carries an authorization code.
    Authorized,
    /// Annulled; excluded from balance adjustments.
    Annulled,
}

impl VoucherStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Authorized => "authorized",
            Self::Annulled => "annulled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "authorized" => Some(Self::Authorized),
            "annulled" => Some(Self::Annulled),
            _ => None,
        }
    }
}

/// The authority's authorization of a voucher (the CAE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Authorization code.
    pub code: String,
    /// Date the code stops being valid for printing.
    pub expires_on: NaiveDate,
    /// When the authorization was recorded locally.
    pub authorized_at: DateTime<Utc>,
}

/// Reference to an original voucher, as sent on notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedVoucherRef {
    /// Type of the original voucher.
    pub voucher_type: VoucherType,
    /// Sales point of the original voucher.
    pub sales_point: u16,
    /// Number of the original voucher.
    pub number: u64,
    /// Issuer tax identifier.
    pub issuer_cuit: Cuit,
    /// Issue date of the original voucher.
    pub issue_date: NaiveDate,
}

/// A fiscal document: invoice, credit note, debit note or receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Voucher ID.
    pub id: VoucherId,
    /// Issuing company.
    pub company_id: CompanyId,
    /// Type (kind + letter).
    pub voucher_type: VoucherType,
    /// Category-specific data.
    pub category: VoucherCategory,
    /// Sales point (1..=9999).
    pub sales_point: u16,
    /// Number, assigned when authorization is granted.
    pub number: Option<u64>,
    /// Number of a submission whose outcome is unknown.
    #[serde(default)]
    pub pending_number: Option<u64>,
    /// Issue date.
    pub issue_date: NaiveDate,
    /// What is billed.
    pub concept: Concept,
    /// Service period, for service concepts.
    pub service_period: Option<ServicePeriod>,
    /// Customer.
    pub counterparty: Counterparty,
    /// Currency.
    pub currency: Currency,
    /// Exchange rate to pesos (1 for pesos).
    pub exchange_rate: Decimal,
    /// Amount breakdown.
    pub amounts: VoucherAmounts,
    /// Authorization, once granted. Immutable afterwards.
    pub authorization: Option<Authorization>,
    /// Original voucher a note targets.
    pub linked_voucher_id: Option<VoucherId>,
    /// Outstanding amount, for vouchers notes can reference.
    pub balance_pending: Option<Decimal>,
    /// Balance state, for vouchers notes can reference.
    pub balance_status: Option<BalanceStatus>,
    /// Fiscal lifecycle status.
    pub status: VoucherStatus,
}

impl Voucher {
    /// Grand total.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.amounts.total
    }

    /// Returns true if the voucher has an authorization code.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        self.authorization.is_some()
    }

    /// The authorization code, if any.
    #[must_use]
    pub fn authorization_code(&self) -> Option<&str> {
        self.authorization.as_ref().map(|a| a.code.as_str())
    }

    /// The authority's code for this voucher's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind/letter combination does not exist.
    pub fn type_code(&self) -> Result<u16, VoucherError> {
        self.voucher_type
            .code()
            .ok_or_else(|| VoucherError::UnknownVoucherType(self.voucher_type.to_string()))
    }

    /// Validates everything that can be checked without the network.
    ///
    /// # Errors
    ///
    /// Returns the first invariant the draft breaks.
    pub fn validate_for_authorization(&self) -> Result<(), VoucherError> {
        if self.is_authorized() {
            return Err(VoucherError::AlreadyAuthorized(self.id));
        }
        if self.status == VoucherStatus::Annulled {
            return Err(VoucherError::Annulled(self.id));
        }
        validate_sales_point(u32::from(self.sales_point))?;
        self.type_code()?;
        self.category.validate_for(&self.voucher_type)?;
        self.amounts.validate(&self.voucher_type)?;

        if self.concept.requires_service_period() && self.service_period.is_none() {
            return Err(VoucherError::MissingServicePeriod);
        }
        if self.voucher_type.is_note() && self.linked_voucher_id.is_none() {
            return Err(VoucherError::MissingLinkedVoucher);
        }
        if self.exchange_rate <= Decimal::ZERO {
            return Err(VoucherError::InvalidExchangeRate);
        }
        Ok(())
    }

    /// Reference to this voucher as the original of a note.
    ///
    /// # Errors
    ///
    /// Returns an error if the voucher has no number or authorization yet.
    pub fn as_linked_ref(&self, issuer_cuit: &Cuit) -> Result<LinkedVoucherRef, VoucherError> {
        match (self.number, &self.authorization) {
            (Some(number), Some(_)) => Ok(LinkedVoucherRef {
                voucher_type: self.voucher_type,
                sales_point: self.sales_point,
                number,
                issuer_cuit: issuer_cuit.clone(),
                issue_date: self.issue_date,
            }),
            _ => Err(VoucherError::LinkedVoucherNotAuthorized(self.id)),
        }
    }

    /// Records the authority's authorization.
    ///
    /// # Errors
    ///
    /// Returns an error if an authorization code is already set.
    pub fn record_authorization(
        &mut self,
        number: u64,
        authorization: Authorization,
    ) -> Result<(), VoucherError> {
        if self.is_authorized() {
            return Err(VoucherError::AlreadyAuthorized(self.id));
        }
        if number == 0 {
            return Err(VoucherError::InvalidNumber);
        }
        self.number = Some(number);
        self.pending_number = None;
        self.authorization = Some(authorization);
        self.status = VoucherStatus::Authorized;
        if self.voucher_type.is_referenceable() {
            self.balance_pending = Some(self.total());
            self.balance_status = Some(BalanceStatus::Open);
        }
        Ok(())
    }
}

/// Checks a sales point is within 1..=9999.
///
/// # Errors
///
/// Returns `InvalidSalesPoint` otherwise.
pub fn validate_sales_point(sales_point: u32) -> Result<u16, VoucherError> {
    u16::try_from(sales_point)
        .ok()
        .filter(|sp| (1..=MAX_SALES_POINT).contains(sp))
        .ok_or(VoucherError::InvalidSalesPoint(sales_point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::amounts::VatRate;
    use crate::voucher::types::{Letter, VoucherKind};
    use rust_decimal_macros::dec;

    fn draft(voucher_type: VoucherType) -> Voucher {
        Voucher {
            id: VoucherId::new(),
            company_id: CompanyId::new(),
            voucher_type,
            category: VoucherCategory::Standard,
            sales_point: 1,
            number: None,
            pending_number: None,
            issue_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            concept: Concept::Products,
            service_period: None,
            counterparty: Counterparty::final_consumer(),
            currency: Currency::Ars,
            exchange_rate: Decimal::ONE,
            amounts: VoucherAmounts::single_rate(VatRate::TwentyOne, dec!(1000)),
            authorization: None,
            linked_voucher_id: None,
            balance_pending: None,
            balance_status: None,
            status: VoucherStatus::Draft,
        }
    }

    fn authorization() -> Authorization {
        Authorization {
            code: "76123456789012".to_string(),
            expires_on: NaiveDate::from_ymd_opt(2026, 10, 29).unwrap(),
            authorized_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_draft() {
        let voucher = draft(VoucherType::new(VoucherKind::Invoice, Letter::B));
        assert!(voucher.validate_for_authorization().is_ok());
        assert_eq!(voucher.type_code(), Ok(6));
    }

    #[test]
    fn test_sales_point_bounds() {
        assert_eq!(validate_sales_point(1), Ok(1));
        assert_eq!(validate_sales_point(9999), Ok(9999));
        assert_eq!(validate_sales_point(0), Err(VoucherError::InvalidSalesPoint(0)));
        assert_eq!(
            validate_sales_point(10_000),
            Err(VoucherError::InvalidSalesPoint(10_000))
        );
    }

    #[test]
    fn test_note_requires_link() {
        let note = draft(VoucherType::new(VoucherKind::CreditNote, Letter::A));
        assert_eq!(
            note.validate_for_authorization(),
            Err(VoucherError::MissingLinkedVoucher)
        );
    }

    #[test]
    fn test_services_require_period() {
        let mut voucher = draft(VoucherType::new(VoucherKind::Invoice, Letter::A));
        voucher.concept = Concept::Services;
        assert_eq!(
            voucher.validate_for_authorization(),
            Err(VoucherError::MissingServicePeriod)
        );
    }

    #[test]
    fn test_record_authorization_opens_balance() {
        let mut voucher = draft(VoucherType::new(VoucherKind::Invoice, Letter::A));
        voucher.pending_number = Some(42);
        voucher.record_authorization(42, authorization()).unwrap();
        assert_eq!(voucher.number, Some(42));
        assert_eq!(voucher.pending_number, None);
        assert_eq!(voucher.status, VoucherStatus::Authorized);
        assert_eq!(voucher.balance_pending, Some(dec!(1210.00)));
        assert_eq!(voucher.balance_status, Some(BalanceStatus::Open));
    }

    #[test]
    fn test_authorization_is_immutable() {
        let mut voucher = draft(VoucherType::new(VoucherKind::Invoice, Letter::A));
        voucher.record_authorization(1, authorization()).unwrap();
        let err = voucher.record_authorization(2, authorization()).unwrap_err();
        assert_eq!(err, VoucherError::AlreadyAuthorized(voucher.id));
        assert_eq!(voucher.number, Some(1));
        assert_eq!(
            voucher.validate_for_authorization(),
            Err(VoucherError::AlreadyAuthorized(voucher.id))
        );
    }

    #[test]
    fn test_linked_ref_requires_authorization() {
        let issuer = Cuit::parse("20-11111111-2").unwrap();
        let mut voucher = draft(VoucherType::new(VoucherKind::Invoice, Letter::A));
        assert!(voucher.as_linked_ref(&issuer).is_err());
        voucher.record_authorization(7, authorization()).unwrap();
        let linked = voucher.as_linked_ref(&issuer).unwrap();
        assert_eq!(linked.number, 7);
        assert_eq!(linked.sales_point, 1);
    }
}
