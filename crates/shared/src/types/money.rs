//! Money type with fixed two-digit precision and currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Every figure sent to the tax authority is a fixed-point value with two
//! decimal digits, so all rounding goes through [`round_cents`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal digits the authority accepts for amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// One cent. Balances strictly below this are treated as zero.
pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, AMOUNT_SCALE);

/// Rounds to cents, half away from zero.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats an amount as the authority expects it (`1234.50`).
#[must_use]
pub fn format_fixed(amount: Decimal) -> String {
    let mut rounded = round_cents(amount);
    rounded.rescale(AMOUNT_SCALE);
    rounded.to_string()
}

/// Represents a monetary amount with currency.
///
/// Uses `Decimal` internally to avoid floating-point precision errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount, rounded to cents.
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: Currency,
}

/// Currencies accepted on vouchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Argentine Peso
    #[default]
    Ars,
    /// US Dollar
    Usd,
    /// Euro
    Eur,
}

impl Money {
    /// Creates a new Money instance, rounding the amount to cents.
    #[must_use]
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: round_cents(amount),
            currency,
        }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

impl Currency {
    /// Currency code used by the authority's invoicing service.
    #[must_use]
    pub const fn afip_code(&self) -> &'static str {
        match self {
            Self::Ars => "PES",
            Self::Usd => "DOL",
            Self::Eur => "060",
        }
    }

    /// Parses the authority's currency code.
    #[must_use]
    pub fn from_afip_code(code: &str) -> Option<Self> {
        match code {
            "PES" => Some(Self::Ars),
            "DOL" => Some(Self::Usd),
            "060" => Some(Self::Eur),
            _ => None,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ars => write!(f, "ARS"),
            Self::Usd => write!(f, "USD"),
            Self::Eur => write!(f, "EUR"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ARS" => Ok(Self::Ars),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[rstest]
    #[case(dec!(10.005), dec!(10.01))]
    #[case(dec!(10.004), dec!(10.00))]
    #[case(dec!(-10.005), dec!(-10.01))]
    #[case(dec!(0.1) + dec!(0.2), dec!(0.30))]
    fn test_round_cents(#[case] input: Decimal, #[case] expected: Decimal) {
        assert_eq!(round_cents(input), expected);
    }

    #[rstest]
    #[case(dec!(1210), "1210.00")]
    #[case(dec!(1210.5), "1210.50")]
    #[case(dec!(0.125), "0.13")]
    #[case(dec!(0), "0.00")]
    fn test_format_fixed(#[case] input: Decimal, #[case] expected: &str) {
        assert_eq!(format_fixed(input), expected);
    }

    #[test]
    fn test_cent_constant() {
        assert_eq!(CENT, dec!(0.01));
    }

    #[test]
    fn test_money_new_rounds() {
        let money = Money::new(dec!(99.999), Currency::Ars);
        assert_eq!(money.amount, dec!(100.00));
        assert_eq!(money.currency, Currency::Ars);
    }

    #[test]
    fn test_money_zero_and_sign() {
        assert!(Money::zero(Currency::Usd).is_zero());
        assert!(!Money::zero(Currency::Usd).is_negative());
        assert!(Money::new(dec!(-1), Currency::Usd).is_negative());
    }

    #[test]
    fn test_currency_afip_codes() {
        assert_eq!(Currency::Ars.afip_code(), "PES");
        assert_eq!(Currency::Usd.afip_code(), "DOL");
        assert_eq!(Currency::Eur.afip_code(), "060");
        assert_eq!(Currency::from_afip_code("DOL"), Some(Currency::Usd));
        assert_eq!(Currency::from_afip_code("XXX"), None);
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!(Currency::from_str("ars").unwrap(), Currency::Ars);
        assert_eq!(Currency::from_str("USD").unwrap(), Currency::Usd);
        assert!(Currency::from_str("JPY").is_err());
    }
}
