use chrono::{Duration, NaiveDate};
use repayment_engine::amortization::schedule::{AmortizationEngine, InterestParameters, ScheduleRequest};
use repayment_engine::core::money::round2;
use repayment_engine::core::plan::AmortizationMethod;
use repayment_engine::core::rate::ValidityPeriod;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Generate a principal between 1.00 and 1,000,000.00.
fn arb_principal() -> impl Strategy<Value = Decimal> {
    (100i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generate an annual rate between 0.00% and 25.00%.
fn arb_rate() -> impl Strategy<Value = Decimal> {
    (0i64..2_500i64).prop_map(|bp| Decimal::new(bp, 2))
}

/// Generate a first due date in 2000..2040.
fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..14_600i64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + Duration::days(offset)
    })
}

fn arb_method() -> impl Strategy<Value = AmortizationMethod> {
    prop::sample::select(vec![AmortizationMethod::Italian, AmortizationMethod::French])
}

/// A request with interest accruing from up to 90 days before the first due date.
fn arb_interest_request() -> impl Strategy<Value = ScheduleRequest> {
    (arb_principal(), 1u32..120, arb_date(), 0i64..90, arb_rate(), arb_method()).prop_map(
        |(principal, count, start_date, lead, rate, method)| ScheduleRequest {
            principal,
            installment_count: count,
            start_date,
            interest: Some(InterestParameters {
                annual_rate_percent: rate,
                interest_start: start_date - Duration::days(lead),
                method,
            }),
        },
    )
}

fn arb_period() -> impl Strategy<Value = ValidityPeriod> {
    (arb_date(), prop::option::of(0i64..800)).prop_map(|(from, length)| {
        ValidityPeriod::new(from, length.map(|days| from + Duration::days(days)))
    })
}

proptest! {
    // ===================================================================
    // Principal portions always add back to the principal, to the cent.
    // ===================================================================
    #[test]
    fn principal_portions_sum_exactly(request in arb_interest_request()) {
        let schedule = AmortizationEngine::generate(&request).unwrap();
        let total: Decimal = schedule.installments().iter().map(|i| i.principal_portion).sum();
        prop_assert_eq!(total, request.principal);
    }

    #[test]
    fn no_interest_portions_sum_exactly(
        principal in arb_principal(),
        count in 1u32..120,
        start in arb_date(),
    ) {
        let schedule = AmortizationEngine::generate(&ScheduleRequest {
            principal,
            installment_count: count,
            start_date: start,
            interest: None,
        })
        .unwrap();
        prop_assert_eq!(schedule.total_principal(), principal);
        prop_assert_eq!(schedule.total_interest(), Decimal::ZERO);
    }

    // ===================================================================
    // Every row's amount is its principal plus its interest, and each
    // row is rounded to cents.
    // ===================================================================
    #[test]
    fn rows_are_consistent(request in arb_interest_request()) {
        let schedule = AmortizationEngine::generate(&request).unwrap();
        for row in schedule.installments() {
            prop_assert_eq!(row.amount, row.principal_portion + row.interest_portion);
            prop_assert_eq!(round2(row.interest_portion), row.interest_portion);
            prop_assert!(row.interest_portion >= Decimal::ZERO);
        }
        prop_assert_eq!(schedule.len(), request.installment_count as usize);
    }

    // ===================================================================
    // Due dates are one calendar month apart and strictly increasing.
    // ===================================================================
    #[test]
    fn due_dates_strictly_increase(request in arb_interest_request()) {
        let schedule = AmortizationEngine::generate(&request).unwrap();
        let rows = schedule.installments();
        prop_assert_eq!(rows[0].due_date, request.start_date);
        for pair in rows.windows(2) {
            prop_assert!(pair[0].due_date < pair[1].due_date);
            prop_assert_eq!(pair[1].sequence_number, pair[0].sequence_number + 1);
        }
    }

    // ===================================================================
    // Italian: constant principal quota on every row but the last, which
    // absorbs the rounding residual.
    // ===================================================================
    #[test]
    fn italian_quota_is_constant(mut request in arb_interest_request()) {
        if let Some(params) = request.interest.as_mut() {
            params.method = AmortizationMethod::Italian;
        }
        let schedule = AmortizationEngine::generate(&request).unwrap();
        let rows = schedule.installments();
        let quota = round2(request.principal / Decimal::from(request.installment_count));
        for row in &rows[..rows.len() - 1] {
            prop_assert_eq!(row.principal_portion, quota);
        }
    }

    // ===================================================================
    // French: every row but the last pays exactly the level payment.
    // ===================================================================
    #[test]
    fn french_pays_level_amount(mut request in arb_interest_request()) {
        if let Some(params) = request.interest.as_mut() {
            params.method = AmortizationMethod::French;
        }
        let schedule = AmortizationEngine::generate(&request).unwrap();
        let level = schedule.level_payment().unwrap();
        let rows = schedule.installments();
        for row in &rows[..rows.len() - 1] {
            prop_assert_eq!(row.amount, level);
        }
    }

    // ===================================================================
    // A zero rate charges no interest under either method.
    // ===================================================================
    #[test]
    fn zero_rate_charges_nothing(mut request in arb_interest_request()) {
        if let Some(params) = request.interest.as_mut() {
            params.annual_rate_percent = Decimal::ZERO;
        }
        let schedule = AmortizationEngine::generate(&request).unwrap();
        prop_assert_eq!(schedule.total_interest(), Decimal::ZERO);
    }

    // ===================================================================
    // Overlap is symmetric, and a window overlaps any window covering
    // its first day.
    // ===================================================================
    #[test]
    fn overlap_is_symmetric(a in arb_period(), b in arb_period()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        if b.covers(a.from) {
            prop_assert!(a.overlaps(&b));
        }
        prop_assert!(a.overlaps(&a));
    }
}
