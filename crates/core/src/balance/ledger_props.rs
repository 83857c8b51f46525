//! Property-based tests for the balance ledger.
//!
//! - Credit then debit notes move the balance by exactly their totals
//! - Cancelled balances are stored as exactly zero
//! - Recomputation is idempotent

use chrono::{NaiveDate, Utc};
use facturo_shared::types::{CompanyId, Currency, VoucherId};
use facturo_shared::types::money::round_cents;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::ledger::BalanceLedger;
use super::types::{BalanceStatus, BalanceView};
use crate::voucher::{
    Authorization, Concept, Counterparty, Letter, Voucher, VoucherAmounts, VoucherCategory,
    VoucherKind, VoucherStatus, VoucherType,
};

fn authorized(kind: VoucherKind, total: Decimal, linked: Option<VoucherId>) -> Voucher {
    Voucher {
        id: VoucherId::new(),
        company_id: CompanyId::new(),
        voucher_type: VoucherType::new(kind, Letter::C),
        category: VoucherCategory::Standard,
        sales_point: 1,
        number: Some(1),
        pending_number: None,
        issue_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        concept: Concept::Products,
        service_period: None,
        counterparty: Counterparty::final_consumer(),
        currency: Currency::Ars,
        exchange_rate: Decimal::ONE,
        amounts: VoucherAmounts::without_vat(total),
        authorization: Some(Authorization {
            code: "70000000000001".to_string(),
            expires_on: NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(),
            authorized_at: Utc::now(),
        }),
        linked_voucher_id: linked,
        balance_pending: None,
        balance_status: None,
        status: VoucherStatus::Authorized,
    }
}

/// Strategy to generate totals (0.01 to 1,000,000.00).
fn total_cents() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* invoice total T, credit C <= T and debit D:
    /// balance == round(T - C), then round(T - C + D).
    #[test]
    fn prop_balance_follows_notes(
        total in total_cents(),
        credit_share in 0u32..=100,
        debit in total_cents(),
    ) {
        let total = Decimal::new(total, 2);
        let credit = round_cents(total * Decimal::from(credit_share) / Decimal::ONE_HUNDRED);
        prop_assume!(credit > Decimal::ZERO);
        let debit = Decimal::new(debit, 2);

        let invoice = authorized(VoucherKind::Invoice, total, None);
        let credit_note = authorized(VoucherKind::CreditNote, credit, Some(invoice.id));

        let after_credit = BalanceLedger::recompute(&invoice, &[credit_note.clone()], &[]).unwrap();
        prop_assert_eq!(after_credit.balance_pending, round_cents(total - credit));

        let debit_note = authorized(VoucherKind::DebitNote, debit, Some(invoice.id));
        let after_debit =
            BalanceLedger::recompute(&invoice, &[credit_note, debit_note], &[]).unwrap();
        prop_assert_eq!(after_debit.balance_pending, round_cents(total - credit + debit));
    }

    /// *For any* invoice fully offset by credit notes, the balance is exactly zero.
    #[test]
    fn prop_full_offset_cancels(total in total_cents(), split in 1u32..99) {
        let total = Decimal::new(total, 2);
        let first = round_cents(total * Decimal::from(split) / Decimal::ONE_HUNDRED);
        let second = total - first;
        prop_assume!(first > Decimal::ZERO && second > Decimal::ZERO);

        let invoice = authorized(VoucherKind::Invoice, total, None);
        let notes = vec![
            authorized(VoucherKind::CreditNote, first, Some(invoice.id)),
            authorized(VoucherKind::CreditNote, second, Some(invoice.id)),
        ];
        let snapshot = BalanceLedger::recompute(&invoice, &notes, &[]).unwrap();
        prop_assert_eq!(snapshot.status, BalanceStatus::Cancelled);
        prop_assert_eq!(snapshot.balance_pending, Decimal::ZERO);
        prop_assert!(BalanceLedger::ensure_credit_fits(Decimal::new(1, 2), &snapshot, BalanceView::Fiscal).is_err());
    }

    /// *For any* set of notes, recomputing twice yields the same snapshot.
    #[test]
    fn prop_recompute_is_idempotent(total in total_cents(), credits in prop::collection::vec(1i64..10_000i64, 0..5)) {
        let invoice = authorized(VoucherKind::Invoice, Decimal::new(total, 2), None);
        let notes: Vec<Voucher> = credits
            .into_iter()
            .map(|c| authorized(VoucherKind::CreditNote, Decimal::new(c, 2), Some(invoice.id)))
            .collect();
        let first = BalanceLedger::recompute(&invoice, &notes, &[]).unwrap();
        let second = BalanceLedger::recompute(&invoice, &notes, &[]).unwrap();
        prop_assert_eq!(first, second);
    }
}
