//! A plan from creation to reopening, against an in-memory store.

use chrono::NaiveDate;
use repayment_engine::config::InterestSettings;
use repayment_engine::core::ids::CaseId;
use repayment_engine::core::plan::{AmortizationMethod, CloseOutcome, InterestTerms, Surcharge};
use repayment_engine::core::rate::{NewInterestRate, RateKind};
use repayment_engine::lifecycle::collaborators::{MemoryHistory, MemoryLedger, MovementKind};
use repayment_engine::lifecycle::plan_service::{
    CloseRequest, CreatePlanRequest, PaymentDetails, PlanLifecycle,
};
use repayment_engine::registry::rate_registry::RateRegistry;
use repayment_engine::store::Database;
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
    let mut db = Database::open_in_memory()?;

    RateRegistry::new(db.connection()).create(&NewInterestRate {
        kind: RateKind::Moratory,
        percentage: dec!(10.15),
        valid_from: d(2025, 1, 1),
        valid_to: Some(d(2025, 6, 30)),
        reference: "D.Lgs. 231/2002, art. 5".into(),
        note: "reference rate 2.15% + 8 points".into(),
    })?;

    let mut service = PlanLifecycle::new(MemoryLedger::new(), MemoryHistory::new(), InterestSettings::default())
        .with_actor("demo");
    let case = CaseId::new(1001);

    // Moratory rate with the standard surcharge: 10.15 + 4 points.
    let plan = service.create_plan(
        &mut db,
        CreatePlanRequest::new(case, dec!(6000), 6, d(2025, 3, 31))
            .with_interest(
                InterestTerms::Moratory {
                    pre_2013: false,
                    surcharge: Surcharge::Standard,
                },
                AmortizationMethod::French,
            )
            .with_interest_start(d(2025, 2, 1)),
    )?;
    println!(
        "Created plan {} at {}% with {} installments, interest {}",
        plan.id,
        plan.resolved_rate.unwrap_or_default(),
        plan.installments.len(),
        plan.total_interest
    );

    for installment in &plan.installments[..2] {
        service.pay_installment(
            &mut db,
            plan.id,
            installment.id,
            PaymentDetails {
                date: Some(installment.due_date),
                method: Some("transfer".into()),
                ..Default::default()
            },
        )?;
        println!("Paid #{} ({})", installment.sequence_number, installment.amount);
    }

    let stats = service.plan_statistics(&db, plan.id, d(2025, 6, 15))?;
    println!("\n{stats}\n");

    let closed = service.close_plan(&mut db, plan.id, CloseRequest::new(CloseOutcome::Negative).with_note("debtor stopped paying"))?;
    println!(
        "Closed as {} with {} recovered",
        closed.state,
        closed.recovered_amount.unwrap_or_default()
    );

    let reopened = service.reopen_plan(&mut db, plan.id)?;
    println!("Reopened: state {}", reopened.state);

    let ledger = service.ledger();
    println!(
        "\nLedger: {} movements, principal recovered {}, interest recovered {}",
        ledger.len(),
        ledger.total(case, MovementKind::PrincipalRecovery),
        ledger.total(case, MovementKind::InterestRecovery)
    );
    println!("History: {} events", service.history().events().len());
    Ok(())
}
