//! Property-based tests for the amount breakdown.
//!
//! - Breakdowns built from lines always satisfy the authority's arithmetic
//! - Any one-cent drift in a declared figure is caught

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::amounts::{VatLine, VatRate, VoucherAmounts};
use super::error::VoucherError;
use super::types::{Letter, VoucherKind, VoucherType};

/// Strategy to generate positive amounts (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_rate() -> impl Strategy<Value = VatRate> {
    prop_oneof![
        Just(VatRate::Zero),
        Just(VatRate::TwoAndHalf),
        Just(VatRate::Five),
        Just(VatRate::TenAndHalf),
        Just(VatRate::TwentyOne),
        Just(VatRate::TwentySeven),
    ]
}

fn arb_lines() -> impl Strategy<Value = Vec<VatLine>> {
    prop::collection::vec(
        (arb_rate(), positive_amount()).prop_map(|(rate, base)| VatLine::from_base(rate, base)),
        1..6,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* set of VAT buckets, the derived breakdown validates.
    #[test]
    fn prop_breakdown_from_lines_is_valid(
        lines in arb_lines(),
        untaxed in positive_amount(),
        exempt in positive_amount(),
    ) {
        let amounts = VoucherAmounts::from_lines(lines, Vec::new(), untaxed, exempt);
        let invoice = VoucherType::new(VoucherKind::Invoice, Letter::A);
        prop_assert!(amounts.validate(&invoice).is_ok());
        prop_assert_eq!(
            amounts.total,
            amounts.net_amount + amounts.untaxed_amount + amounts.exempt_amount + amounts.tax_amount
        );
    }

    /// *For any* breakdown, moving the declared net by one cent is rejected.
    #[test]
    fn prop_net_drift_is_rejected(lines in arb_lines(), up in any::<bool>()) {
        let mut amounts = VoucherAmounts::from_lines(lines, Vec::new(), Decimal::ZERO, Decimal::ZERO);
        let cent = Decimal::new(1, 2);
        let drift = if up { cent } else { -cent };
        amounts.net_amount += drift;
        amounts.total += drift;
        let invoice = VoucherType::new(VoucherKind::Invoice, Letter::B);
        let result = amounts.validate(&invoice);
        let is_net_mismatch = matches!(
            result,
            Err(VoucherError::AmountMismatch { field: "net_amount", .. })
        );
        prop_assert!(is_net_mismatch);
    }
}
