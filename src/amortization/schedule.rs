use crate::core::calendar::{add_months, days_between};
use crate::core::money::{round2, simple_interest};
use crate::core::plan::AmortizationMethod;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the installments of one schedule (a century of monthly payments).
pub const MAX_INSTALLMENTS: u32 = 1200;

/// Errors arising from schedule generation.
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(Decimal),
    #[error("installment count must be at least 1")]
    NoInstallments,
    #[error("installment count {0} exceeds the maximum of {MAX_INSTALLMENTS}")]
    TooManyInstallments(u32),
    #[error("annual rate must not be negative, got {0}")]
    NegativeRate(Decimal),
    #[error("principal {principal} is too small for {count} installments")]
    InstallmentTooSmall { principal: Decimal, count: u32 },
}

/// Interest inputs for an interest-bearing schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterestParameters {
    /// Annual rate as a percentage (5 means 5%).
    pub annual_rate_percent: Decimal,
    /// Accrual start for the first installment.
    pub interest_start: NaiveDate,
    pub method: AmortizationMethod,
}

/// Input of [`AmortizationEngine::generate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub principal: Decimal,
    pub installment_count: u32,
    pub start_date: NaiveDate,
    pub interest: Option<InterestParameters>,
}

/// One computed row of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub sequence_number: u32,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub principal_portion: Decimal,
    pub interest_portion: Decimal,
}

/// An ordered amortization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    principal: Decimal,
    method: Option<AmortizationMethod>,
    /// Constant payment of the french method, rounded.
    level_payment: Option<Decimal>,
    installments: Vec<ScheduledInstallment>,
}

impl Schedule {
    pub fn principal(&self) -> Decimal {
        self.principal
    }

    /// `None` for interest-free schedules.
    pub fn method(&self) -> Option<AmortizationMethod> {
        self.method
    }

    pub fn level_payment(&self) -> Option<Decimal> {
        self.level_payment
    }

    pub fn installments(&self) -> &[ScheduledInstallment] {
        &self.installments
    }

    pub fn into_installments(self) -> Vec<ScheduledInstallment> {
        self.installments
    }

    pub fn len(&self) -> usize {
        self.installments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    pub fn total_interest(&self) -> Decimal {
        self.installments.iter().map(|i| i.interest_portion).sum()
    }

    pub fn total_principal(&self) -> Decimal {
        self.installments.iter().map(|i| i.principal_portion).sum()
    }

    pub fn total_amount(&self) -> Decimal {
        self.installments.iter().map(|i| i.amount).sum()
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Amortization Schedule ===")?;
        writeln!(f, "Principal:      {}", self.principal)?;
        match self.method {
            Some(method) => writeln!(f, "Method:         {}", method)?,
            None => writeln!(f, "Method:         no interest")?,
        }
        if let Some(level) = self.level_payment {
            writeln!(f, "Level payment:  {}", level)?;
        }
        writeln!(f, "Total interest: {}", self.total_interest())?;
        writeln!(f, "Total due:      {}", self.total_amount())?;
        writeln!(
            f,
            "\n{:>4}  {:<10}  {:>14}  {:>14}  {:>12}",
            "#", "due", "amount", "principal", "interest"
        )?;
        for row in &self.installments {
            writeln!(
                f,
                "{:>4}  {:<10}  {:>14}  {:>14}  {:>12}",
                row.sequence_number,
                row.due_date,
                row.amount,
                row.principal_portion,
                row.interest_portion
            )?;
        }
        Ok(())
    }
}

/// The amortization engine.
///
/// Due dates fall on `start_date + i` calendar months for `i = 0..N`.
/// Interest, when applied, follows the civil-law simple-interest rule
/// `balance × rate% × days / 36500` on the balance outstanding before each
/// installment, with `days` the actual gap since the previous due date
/// (or since the interest start for the first installment). Every
/// schedule reconciles so that its principal portions sum to the
/// principal exactly.
pub struct AmortizationEngine;

impl AmortizationEngine {
    /// Generate a schedule for `request`.
    ///
    /// The principal is normalised to two decimals before use.
    ///
    /// # Examples
    ///
    /// ```
    /// use repayment_engine::amortization::schedule::{AmortizationEngine, ScheduleRequest};
    /// use chrono::NaiveDate;
    /// use rust_decimal_macros::dec;
    ///
    /// let schedule = AmortizationEngine::generate(&ScheduleRequest {
    ///     principal: dec!(10000.00),
    ///     installment_count: 3,
    ///     start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
    ///     interest: None,
    /// })
    /// .unwrap();
    ///
    /// let portions: Vec<_> = schedule.installments().iter().map(|i| i.principal_portion).collect();
    /// assert_eq!(portions, vec![dec!(3333.33), dec!(3333.33), dec!(3333.34)]);
    /// ```
    pub fn generate(request: &ScheduleRequest) -> Result<Schedule, ScheduleError> {
        let principal = round2(request.principal);
        if principal <= Decimal::ZERO {
            return Err(ScheduleError::NonPositivePrincipal(request.principal));
        }
        if request.installment_count == 0 {
            return Err(ScheduleError::NoInstallments);
        }
        if request.installment_count > MAX_INSTALLMENTS {
            return Err(ScheduleError::TooManyInstallments(request.installment_count));
        }
        if round2(principal / Decimal::from(request.installment_count)) <= Decimal::ZERO {
            return Err(ScheduleError::InstallmentTooSmall {
                principal,
                count: request.installment_count,
            });
        }

        match request.interest {
            None => Ok(Self::without_interest(
                principal,
                request.installment_count,
                request.start_date,
            )),
            Some(params) => {
                if params.annual_rate_percent < Decimal::ZERO {
                    return Err(ScheduleError::NegativeRate(params.annual_rate_percent));
                }
                Ok(match params.method {
                    AmortizationMethod::Italian => Self::italian(
                        principal,
                        request.installment_count,
                        request.start_date,
                        &params,
                    ),
                    AmortizationMethod::French => Self::french(
                        principal,
                        request.installment_count,
                        request.start_date,
                        &params,
                    ),
                })
            }
        }
    }

    /// Equal rounded portions; the residual lands on the last installment.
    pub fn without_interest(principal: Decimal, count: u32, start_date: NaiveDate) -> Schedule {
        let portion = round2(principal / Decimal::from(count));
        let mut installments: Vec<ScheduledInstallment> = (0..count)
            .map(|i| ScheduledInstallment {
                sequence_number: i + 1,
                due_date: add_months(start_date, i),
                amount: portion,
                principal_portion: portion,
                interest_portion: Decimal::ZERO,
            })
            .collect();

        absorb_residual(principal, &mut installments);

        Schedule {
            principal,
            method: None,
            level_payment: None,
            installments,
        }
    }

    /// Constant principal quota, interest on the declining balance.
    pub fn italian(
        principal: Decimal,
        count: u32,
        start_date: NaiveDate,
        params: &InterestParameters,
    ) -> Schedule {
        let quota = principal / Decimal::from(count);
        let mut balance = principal;
        let mut previous = params.interest_start;
        let mut installments = Vec::with_capacity(count as usize);

        for i in 0..count {
            let due_date = add_months(start_date, i);
            let days = days_between(previous, due_date);
            let interest = round2(simple_interest(balance, params.annual_rate_percent, days));
            let principal_portion = round2(quota);

            installments.push(ScheduledInstallment {
                sequence_number: i + 1,
                due_date,
                amount: principal_portion + interest,
                principal_portion,
                interest_portion: interest,
            });

            balance -= quota;
            previous = due_date;
        }

        absorb_residual(principal, &mut installments);

        Schedule {
            principal,
            method: Some(AmortizationMethod::Italian),
            level_payment: None,
            installments,
        }
    }

    /// Constant level payment; the last installment settles the remaining balance.
    pub fn french(
        principal: Decimal,
        count: u32,
        start_date: NaiveDate,
        params: &InterestParameters,
    ) -> Schedule {
        let level = round2(level_payment(principal, params.annual_rate_percent, count));
        let mut balance = principal;
        let mut previous = params.interest_start;
        let mut installments = Vec::with_capacity(count as usize);

        for i in 0..count {
            let due_date = add_months(start_date, i);
            let days = days_between(previous, due_date);
            let interest = round2(simple_interest(balance, params.annual_rate_percent, days));
            let is_last = i + 1 == count;

            let principal_portion = if is_last { balance } else { level - interest };

            installments.push(ScheduledInstallment {
                sequence_number: i + 1,
                due_date,
                amount: principal_portion + interest,
                principal_portion,
                interest_portion: interest,
            });

            balance -= principal_portion;
            previous = due_date;
        }

        Schedule {
            principal,
            method: Some(AmortizationMethod::French),
            level_payment: Some(level),
            installments,
        }
    }
}

/// Annuity payment `P × m / (1 − (1+m)^−N)` with `m` the monthly rate.
///
/// The discount factor `(1+m)^−N` only shrinks, so long schedules at high
/// rates stay within `Decimal` range. Falls back to `P / N` for a zero rate.
pub fn level_payment(principal: Decimal, annual_rate_percent: Decimal, count: u32) -> Decimal {
    let monthly = annual_rate_percent / Decimal::ONE_HUNDRED / Decimal::from(12);
    if monthly == Decimal::ZERO {
        return principal / Decimal::from(count);
    }
    let base = Decimal::ONE + monthly;
    let mut discount = Decimal::ONE;
    for _ in 0..count {
        discount /= base;
    }
    principal * monthly / (Decimal::ONE - discount)
}

/// Add `principal − Σ portions` to the last row so the portions sum exactly.
fn absorb_residual(principal: Decimal, installments: &mut [ScheduledInstallment]) {
    let allocated: Decimal = installments.iter().map(|i| i.principal_portion).sum();
    let residual = principal - allocated;
    if residual != Decimal::ZERO {
        if let Some(last) = installments.last_mut() {
            last.principal_portion += residual;
            last.amount += residual;
        }
    }
}
