//! Voucher amount breakdown.
//!
//! The authority checks that the VAT buckets add up to the taxed net, that
//! the VAT lines add up to the declared VAT, and that the total is the sum of
//! every component. All comparisons happen after rounding to cents.

use facturo_shared::types::money::{CENT, round_cents};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::VoucherError;
use super::types::VoucherType;

/// VAT rates with the authority's rate identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatRate {
    /// 0 %
    Zero,
    /// 2.5 %
    TwoAndHalf,
    /// 5 %
    Five,
    /// 10.5 %
    TenAndHalf,
    /// 21 %
    TwentyOne,
    /// 27 %
    TwentySeven,
}

impl VatRate {
    /// The authority's identifier for this rate.
    #[must_use]
    pub const fn id(&self) -> u16 {
        match self {
            Self::Zero => 3,
            Self::TenAndHalf => 4,
            Self::TwentyOne => 5,
            Self::TwentySeven => 6,
            Self::Five => 8,
            Self::TwoAndHalf => 9,
        }
    }

    /// Looks up a rate by the authority's identifier.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            3 => Some(Self::Zero),
            4 => Some(Self::TenAndHalf),
            5 => Some(Self::TwentyOne),
            6 => Some(Self::TwentySeven),
            8 => Some(Self::Five),
            9 => Some(Self::TwoAndHalf),
            _ => None,
        }
    }

    /// Rate as a percentage (21 for 21 %).
    #[must_use]
    pub fn percentage(&self) -> Decimal {
        match self {
            Self::Zero => Decimal::ZERO,
            Self::TwoAndHalf => Decimal::new(25, 1),
            Self::Five => Decimal::new(5, 0),
            Self::TenAndHalf => Decimal::new(105, 1),
            Self::TwentyOne => Decimal::new(21, 0),
            Self::TwentySeven => Decimal::new(27, 0),
        }
    }

    /// VAT due on `base`, rounded to cents.
    #[must_use]
    pub fn apply(&self, base: Decimal) -> Decimal {
        round_cents(base * self.percentage() / Decimal::ONE_HUNDRED)
    }
}

/// One VAT bucket: taxed base and VAT amount at a given rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatLine {
    /// Rate of this bucket.
    pub rate: VatRate,
    /// Taxed base.
    pub base: Decimal,
    /// VAT amount.
    pub amount: Decimal,
}

impl VatLine {
    /// Builds a bucket computing the VAT from the base.
    #[must_use]
    pub fn from_base(rate: VatRate, base: Decimal) -> Self {
        let base = round_cents(base);
        Self {
            rate,
            base,
            amount: rate.apply(base),
        }
    }
}

/// Other tributes (perceptions, municipal taxes) charged on the voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TributeLine {
    /// The authority's tribute identifier.
    pub tribute_id: u16,
    /// Free-text description.
    pub description: String,
    /// Base the tribute is computed on.
    pub base: Decimal,
    /// Rate as a percentage.
    pub rate: Decimal,
    /// Charged amount.
    pub amount: Decimal,
}

/// Full amount breakdown of a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherAmounts {
    /// Taxed net amount (sum of VAT bases).
    pub net_amount: Decimal,
    /// Amount not subject to VAT.
    pub untaxed_amount: Decimal,
    /// VAT-exempt amount.
    pub exempt_amount: Decimal,
    /// VAT amount (sum of VAT lines).
    pub tax_amount: Decimal,
    /// Other tributes (sum of tribute lines).
    pub other_charges_amount: Decimal,
    /// Grand total.
    pub total: Decimal,
    /// VAT buckets.
    pub vat_lines: Vec<VatLine>,
    /// Tribute lines.
    pub tributes: Vec<TributeLine>,
}

impl VoucherAmounts {
    /// Builds a consistent breakdown from its lines.
    #[must_use]
    pub fn from_lines(
        vat_lines: Vec<VatLine>,
        tributes: Vec<TributeLine>,
        untaxed_amount: Decimal,
        exempt_amount: Decimal,
    ) -> Self {
        let net_amount = round_cents(vat_lines.iter().map(|l| l.base).sum());
        let tax_amount = round_cents(vat_lines.iter().map(|l| l.amount).sum());
        let other_charges_amount = round_cents(tributes.iter().map(|t| t.amount).sum());
        let untaxed_amount = round_cents(untaxed_amount);
        let exempt_amount = round_cents(exempt_amount);
        let total = round_cents(
            net_amount + untaxed_amount + exempt_amount + tax_amount + other_charges_amount,
        );

        Self {
            net_amount,
            untaxed_amount,
            exempt_amount,
            tax_amount,
            other_charges_amount,
            total,
            vat_lines,
            tributes,
        }
    }

    /// Single-bucket breakdown for the common case of one VAT rate.
    #[must_use]
    pub fn single_rate(rate: VatRate, net: Decimal) -> Self {
        Self::from_lines(
            vec![VatLine::from_base(rate, net)],
            Vec::new(),
            Decimal::ZERO,
            Decimal::ZERO,
        )
    }

    /// Breakdown for letter C vouchers, which carry no VAT.
    #[must_use]
    pub fn without_vat(net: Decimal) -> Self {
        let net = round_cents(net);
        Self {
            net_amount: net,
            untaxed_amount: Decimal::ZERO,
            exempt_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            other_charges_amount: Decimal::ZERO,
            total: net,
            vat_lines: Vec::new(),
            tributes: Vec::new(),
        }
    }

    /// Checks the breakdown against the authority's arithmetic rules.
    ///
    /// # Errors
    ///
    /// Returns the first rule that does not hold.
    pub fn validate(&self, voucher_type: &VoucherType) -> Result<(), VoucherError> {
        let declared = [
            ("net_amount", self.net_amount),
            ("untaxed_amount", self.untaxed_amount),
            ("exempt_amount", self.exempt_amount),
            ("tax_amount", self.tax_amount),
            ("other_charges_amount", self.other_charges_amount),
            ("total", self.total),
        ];
        for (field, value) in declared {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(VoucherError::NegativeAmount(field));
            }
        }
        for line in &self.vat_lines {
            if line.base.is_sign_negative() || line.amount.is_sign_negative() {
                return Err(VoucherError::NegativeAmount("vat_lines"));
            }
        }
        for tribute in &self.tributes {
            if tribute.amount.is_sign_negative() {
                return Err(VoucherError::NegativeAmount("tributes"));
            }
        }

        if voucher_type.discriminates_vat() {
            check("net_amount", self.net_amount, self.vat_lines.iter().map(|l| l.base).sum())?;
            check("tax_amount", self.tax_amount, self.vat_lines.iter().map(|l| l.amount).sum())?;
            for line in &self.vat_lines {
                let expected = line.rate.apply(line.base);
                if (round_cents(line.amount) - expected).abs() > CENT {
                    return Err(VoucherError::AmountMismatch {
                        field: "vat_lines",
                        declared: line.amount,
                        computed: expected,
                    });
                }
            }
        } else if !self.vat_lines.is_empty() || !self.tax_amount.is_zero() {
            return Err(VoucherError::VatNotAllowed);
        }

        check(
            "other_charges_amount",
            self.other_charges_amount,
            self.tributes.iter().map(|t| t.amount).sum(),
        )?;
        check(
            "total",
            self.total,
            self.net_amount
                + self.untaxed_amount
                + self.exempt_amount
                + self.tax_amount
                + self.other_charges_amount,
        )?;

        if round_cents(self.total) <= Decimal::ZERO {
            return Err(VoucherError::ZeroTotal);
        }
        Ok(())
    }
}

fn check(field: &'static str, declared: Decimal, computed: Decimal) -> Result<(), VoucherError> {
    let declared = round_cents(declared);
    let computed = round_cents(computed);
    if declared == computed {
        Ok(())
    } else {
        Err(VoucherError::AmountMismatch {
            field,
            declared,
            computed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::types::{Letter, VoucherKind};
    use rust_decimal_macros::dec;

    fn invoice_a() -> VoucherType {
        VoucherType::new(VoucherKind::Invoice, Letter::A)
    }

    #[test]
    fn test_rate_ids_round_trip() {
        for rate in [
            VatRate::Zero,
            VatRate::TwoAndHalf,
            VatRate::Five,
            VatRate::TenAndHalf,
            VatRate::TwentyOne,
            VatRate::TwentySeven,
        ] {
            assert_eq!(VatRate::from_id(rate.id()), Some(rate));
        }
        assert_eq!(VatRate::from_id(7), None);
    }

    #[test]
    fn test_single_rate_breakdown() {
        let amounts = VoucherAmounts::single_rate(VatRate::TwentyOne, dec!(1000));
        assert_eq!(amounts.net_amount, dec!(1000.00));
        assert_eq!(amounts.tax_amount, dec!(210.00));
        assert_eq!(amounts.total, dec!(1210.00));
        assert!(amounts.validate(&invoice_a()).is_ok());
    }

    #[test]
    fn test_multi_rate_breakdown() {
        let amounts = VoucherAmounts::from_lines(
            vec![
                VatLine::from_base(VatRate::TwentyOne, dec!(100.10)),
                VatLine::from_base(VatRate::TenAndHalf, dec!(50.05)),
            ],
            vec![TributeLine {
                tribute_id: 7,
                description: "Percepcion IIBB".to_string(),
                base: dec!(150.15),
                rate: dec!(3),
                amount: dec!(4.50),
            }],
            dec!(10),
            dec!(5),
        );
        // 21.02 + 5.26 (5.25525 rounded)
        assert_eq!(amounts.tax_amount, dec!(26.28));
        assert_eq!(amounts.total, dec!(150.15) + dec!(10) + dec!(5) + dec!(26.28) + dec!(4.50));
        assert!(amounts.validate(&invoice_a()).is_ok());
    }

    #[test]
    fn test_bucket_sum_mismatch() {
        let mut amounts = VoucherAmounts::single_rate(VatRate::TwentyOne, dec!(1000));
        amounts.net_amount = dec!(999.99);
        amounts.total = dec!(1209.99);
        assert_eq!(
            amounts.validate(&invoice_a()),
            Err(VoucherError::AmountMismatch {
                field: "net_amount",
                declared: dec!(999.99),
                computed: dec!(1000.00),
            })
        );
    }

    #[test]
    fn test_vat_line_rate_mismatch() {
        let mut amounts = VoucherAmounts::single_rate(VatRate::TwentyOne, dec!(1000));
        amounts.vat_lines[0].amount = dec!(105.00);
        amounts.tax_amount = dec!(105.00);
        amounts.total = dec!(1105.00);
        assert!(matches!(
            amounts.validate(&invoice_a()),
            Err(VoucherError::AmountMismatch { field: "vat_lines", .. })
        ));
    }

    #[test]
    fn test_total_mismatch() {
        let mut amounts = VoucherAmounts::single_rate(VatRate::TwentyOne, dec!(1000));
        amounts.total = dec!(1200);
        assert!(matches!(
            amounts.validate(&invoice_a()),
            Err(VoucherError::AmountMismatch { field: "total", .. })
        ));
    }

    #[test]
    fn test_letter_c_rejects_vat() {
        let invoice_c = VoucherType::new(VoucherKind::Invoice, Letter::C);
        let with_vat = VoucherAmounts::single_rate(VatRate::TwentyOne, dec!(100));
        assert_eq!(with_vat.validate(&invoice_c), Err(VoucherError::VatNotAllowed));
        assert!(VoucherAmounts::without_vat(dec!(100)).validate(&invoice_c).is_ok());
    }

    #[test]
    fn test_negative_and_zero_totals() {
        let mut amounts = VoucherAmounts::without_vat(dec!(100));
        amounts.exempt_amount = dec!(-1);
        let invoice_c = VoucherType::new(VoucherKind::Invoice, Letter::C);
        assert_eq!(
            amounts.validate(&invoice_c),
            Err(VoucherError::NegativeAmount("exempt_amount"))
        );
        assert_eq!(
            VoucherAmounts::without_vat(dec!(0)).validate(&invoice_c),
            Err(VoucherError::ZeroTotal)
        );
    }
}
