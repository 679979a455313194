use crate::core::ids::PlanId;
use crate::core::plan::{Plan, PlanState};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// The next unpaid installment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextDue {
    pub sequence_number: u32,
    pub due_date: NaiveDate,
    pub amount: Decimal,
}

/// Progress figures of one plan as of a given day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStatistics {
    pub plan_id: PlanId,
    pub state: PlanState,
    pub installment_count: usize,
    pub paid_count: usize,
    pub unpaid_count: usize,
    pub overdue_count: usize,
    pub scheduled_total: Decimal,
    pub paid_total: Decimal,
    pub outstanding_total: Decimal,
    pub principal_recovered: Decimal,
    pub interest_recovered: Decimal,
    pub total_interest: Decimal,
    pub next_due: Option<NextDue>,
}

impl PlanStatistics {
    pub fn compute(plan: &Plan, today: NaiveDate) -> Self {
        let paid: Vec<_> = plan.installments.iter().filter(|i| i.is_paid()).collect();
        let scheduled_total = plan.scheduled_total();
        let paid_total: Decimal = paid.iter().map(|i| i.amount).sum();
        let next_due = plan
            .installments
            .iter()
            .filter(|i| !i.is_paid())
            .min_by_key(|i| (i.due_date, i.sequence_number))
            .map(|i| NextDue {
                sequence_number: i.sequence_number,
                due_date: i.due_date,
                amount: i.amount,
            });

        PlanStatistics {
            plan_id: plan.id,
            state: plan.state,
            installment_count: plan.installments.len(),
            paid_count: paid.len(),
            unpaid_count: plan.installments.len() - paid.len(),
            overdue_count: plan.installments.iter().filter(|i| i.is_overdue(today)).count(),
            scheduled_total,
            paid_total,
            outstanding_total: scheduled_total - paid_total,
            principal_recovered: paid.iter().map(|i| i.principal_portion).sum(),
            interest_recovered: paid.iter().map(|i| i.interest_portion).sum(),
            total_interest: plan.total_interest,
            next_due,
        }
    }

    /// Paid share of the scheduled total, 0–100.
    pub fn completion_percent(&self) -> f64 {
        if self.scheduled_total == Decimal::ZERO {
            return 0.0;
        }
        (self.paid_total * Decimal::ONE_HUNDRED / self.scheduled_total)
            .to_f64()
            .unwrap_or(0.0)
    }
}

impl std::fmt::Display for PlanStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Plan {} ({}) ===", self.plan_id, self.state)?;
        writeln!(
            f,
            "Installments:   {} paid / {} unpaid / {} overdue",
            self.paid_count, self.unpaid_count, self.overdue_count
        )?;
        writeln!(f, "Scheduled:      {}", self.scheduled_total)?;
        writeln!(f, "Paid:           {}", self.paid_total)?;
        writeln!(f, "Outstanding:    {}", self.outstanding_total)?;
        writeln!(f, "Principal rec.: {}", self.principal_recovered)?;
        writeln!(f, "Interest rec.:  {}", self.interest_recovered)?;
        writeln!(f, "Completion:     {:.1}%", self.completion_percent())?;
        if let Some(next) = &self.next_due {
            writeln!(
                f,
                "Next due:       #{} on {} ({})",
                next.sequence_number, next.due_date, next.amount
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{CaseId, InstallmentId, MovementId};
    use crate::core::plan::{AmortizationMethod, Installment, InterestTerms, PaymentRecord};
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn installment(seq: u32, due: NaiveDate, paid: bool) -> Installment {
        Installment {
            id: InstallmentId::new(seq as i64),
            sequence_number: seq,
            amount: dec!(110),
            principal_portion: dec!(100),
            interest_portion: dec!(10),
            due_date: due,
            payment: paid.then(|| PaymentRecord {
                date: due,
                method: None,
                reference: None,
                receipt_location: None,
                principal_movement_id: MovementId::new_v4(),
                interest_movement_id: Some(MovementId::new_v4()),
            }),
        }
    }

    fn plan() -> Plan {
        Plan {
            id: PlanId::new(1),
            case_id: CaseId::new(1),
            principal: dec!(400),
            installment_count: 4,
            start_date: d(2024, 1, 1),
            state: PlanState::Active,
            close_date: None,
            recovered_amount: None,
            amount_posted: false,
            recovery_movement_id: None,
            interest: InterestTerms::Legal,
            interest_start: None,
            resolved_rate: Some(dec!(5)),
            method: AmortizationMethod::Italian,
            total_interest: dec!(40),
            accrued_interest_movement_id: None,
            notes: String::new(),
            installments: vec![
                installment(1, d(2024, 1, 1), true),
                installment(2, d(2024, 2, 1), false),
                installment(3, d(2024, 3, 1), false),
                installment(4, d(2024, 4, 1), false),
            ],
        }
    }

    #[test]
    fn test_statistics_counts_and_totals() {
        let stats = PlanStatistics::compute(&plan(), d(2024, 3, 15));
        assert_eq!(stats.paid_count, 1);
        assert_eq!(stats.unpaid_count, 3);
        assert_eq!(stats.overdue_count, 2);
        assert_eq!(stats.paid_total, dec!(110));
        assert_eq!(stats.outstanding_total, dec!(330));
        assert_eq!(stats.principal_recovered, dec!(100));
        assert_eq!(stats.interest_recovered, dec!(10));
        assert_eq!(stats.next_due.as_ref().unwrap().sequence_number, 2);
        assert_relative_eq!(stats.completion_percent(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fully_paid_plan_has_no_next_due() {
        let mut p = plan();
        p.installments = vec![installment(1, d(2024, 1, 1), true)];
        let stats = PlanStatistics::compute(&p, d(2025, 1, 1));
        assert!(stats.next_due.is_none());
        assert_eq!(stats.overdue_count, 0);
        assert_relative_eq!(stats.completion_percent(), 100.0, epsilon = 1e-9);
    }
}
