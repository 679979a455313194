//! Italian and french schedules for the same debt.
//!
//! Shows how the two amortization methods spread principal and interest
//! over the installments of a plan.

use chrono::NaiveDate;
use repayment_engine::amortization::schedule::{AmortizationEngine, InterestParameters, ScheduleRequest};
use repayment_engine::core::plan::AmortizationMethod;
use rust_decimal_macros::dec;

fn main() {
    println!("╔═════════════════════════════════════════════╗");
    println!("║  repayment-engine: Basic Schedule Example   ║");
    println!("╚═════════════════════════════════════════════╝\n");

    let start = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
    let interest_start = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();

    // --- Scenario 1: No interest ---
    println!("━━━ Scenario 1: 10,000.00 over 3 installments, no interest ━━━\n");
    let plain = AmortizationEngine::generate(&ScheduleRequest {
        principal: dec!(10000.00),
        installment_count: 3,
        start_date: start,
        interest: None,
    })
    .unwrap();
    println!("{plain}");

    // --- Scenario 2 and 3: same debt, both methods ---
    for (n, method) in [(2, AmortizationMethod::Italian), (3, AmortizationMethod::French)] {
        println!("━━━ Scenario {n}: 12,000.00 over 12 installments at 10.15%, {method} ━━━\n");
        let schedule = AmortizationEngine::generate(&ScheduleRequest {
            principal: dec!(12000.00),
            installment_count: 12,
            start_date: start,
            interest: Some(InterestParameters {
                annual_rate_percent: dec!(10.15),
                interest_start,
                method,
            }),
        })
        .unwrap();
        println!("{schedule}");
        println!("Total interest: {}\n", schedule.total_interest());
    }
}
