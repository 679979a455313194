use crate::core::ids::{CaseId, InstallmentId, MovementId, PlanId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a [`Plan`].
///
/// `Suspended` is reserved: it can be stored and read back, but no
/// operation moves a plan into or out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Active,
    Suspended,
    ClosedPositive,
    ClosedNegative,
}

impl PlanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanState::Active => "active",
            PlanState::Suspended => "suspended",
            PlanState::ClosedPositive => "closed_positive",
            PlanState::ClosedNegative => "closed_negative",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PlanState::ClosedPositive | PlanState::ClosedNegative)
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PlanState::Active),
            "suspended" => Ok(PlanState::Suspended),
            "closed_positive" => Ok(PlanState::ClosedPositive),
            "closed_negative" => Ok(PlanState::ClosedNegative),
            other => Err(format!("unknown plan state: {other}")),
        }
    }
}

/// How the outcome of a closed plan is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Positive,
    Negative,
}

impl CloseOutcome {
    pub fn state(self) -> PlanState {
        match self {
            CloseOutcome::Positive => PlanState::ClosedPositive,
            CloseOutcome::Negative => PlanState::ClosedNegative,
        }
    }
}

/// Amortization method for interest-bearing plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmortizationMethod {
    /// Constant principal quota, declining interest.
    #[default]
    Italian,
    /// Constant total payment, increasing principal share.
    French,
}

impl AmortizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmortizationMethod::Italian => "italian",
            AmortizationMethod::French => "french",
        }
    }
}

impl fmt::Display for AmortizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmortizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "italian" => Ok(AmortizationMethod::Italian),
            "french" => Ok(AmortizationMethod::French),
            other => Err(format!("unknown amortization method: {other}")),
        }
    }
}

/// Optional moratory surcharge requested at plan creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surcharge {
    #[default]
    None,
    /// The configured default number of points.
    Standard,
    /// Caller-supplied points.
    Custom(Decimal),
}

/// Interest configuration of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterestTerms {
    #[default]
    None,
    Legal,
    Moratory {
        /// Debt arose before 2013: one point less than the registry rate.
        #[serde(default)]
        pre_2013: bool,
        #[serde(default)]
        surcharge: Surcharge,
    },
    Fixed {
        rate: Decimal,
    },
}

/// Discriminant of [`InterestTerms`] for interest-bearing plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestKind {
    Legal,
    Moratory,
    Fixed,
}

impl InterestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterestKind::Legal => "legal",
            InterestKind::Moratory => "moratory",
            InterestKind::Fixed => "fixed",
        }
    }
}

impl FromStr for InterestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legal" => Ok(InterestKind::Legal),
            "moratory" => Ok(InterestKind::Moratory),
            "fixed" => Ok(InterestKind::Fixed),
            other => Err(format!("unknown interest kind: {other}")),
        }
    }
}

impl InterestTerms {
    pub fn applies_interest(&self) -> bool {
        !matches!(self, InterestTerms::None)
    }

    pub fn kind(&self) -> Option<InterestKind> {
        match self {
            InterestTerms::None => None,
            InterestTerms::Legal => Some(InterestKind::Legal),
            InterestTerms::Moratory { .. } => Some(InterestKind::Moratory),
            InterestTerms::Fixed { .. } => Some(InterestKind::Fixed),
        }
    }
}

/// Payment data recorded on a paid installment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub date: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
    /// Opaque location in the receipt store.
    pub receipt_location: Option<String>,
    pub principal_movement_id: MovementId,
    pub interest_movement_id: Option<MovementId>,
}

/// One scheduled payment within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub sequence_number: u32,
    pub amount: Decimal,
    pub principal_portion: Decimal,
    pub interest_portion: Decimal,
    pub due_date: NaiveDate,
    /// Present exactly when the installment is paid.
    pub payment: Option<PaymentRecord>,
}

impl Installment {
    pub fn is_paid(&self) -> bool {
        self.payment.is_some()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_paid() && self.due_date < today
    }
}

/// An amortization plan attached to one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub case_id: CaseId,
    pub principal: Decimal,
    pub installment_count: u32,
    pub start_date: NaiveDate,
    pub state: PlanState,
    pub close_date: Option<NaiveDate>,
    /// Sum of paid installments, fixed at closing.
    pub recovered_amount: Option<Decimal>,
    /// Whether `recovered_amount` has been posted to the ledger.
    pub amount_posted: bool,
    pub recovery_movement_id: Option<MovementId>,
    pub interest: InterestTerms,
    /// First day of interest accrual; defaults to `start_date`.
    pub interest_start: Option<NaiveDate>,
    /// Annual percentage actually applied, after moratory adjustments.
    pub resolved_rate: Option<Decimal>,
    pub method: AmortizationMethod,
    pub total_interest: Decimal,
    pub accrued_interest_movement_id: Option<MovementId>,
    pub notes: String,
    pub installments: Vec<Installment>,
}

impl Plan {
    pub fn applies_interest(&self) -> bool {
        self.interest.applies_interest()
    }

    pub fn interest_kind(&self) -> Option<InterestKind> {
        self.interest.kind()
    }

    pub fn is_active(&self) -> bool {
        self.state == PlanState::Active
    }

    pub fn installment(&self, id: InstallmentId) -> Option<&Installment> {
        self.installments.iter().find(|i| i.id == id)
    }

    pub fn installment_by_sequence(&self, sequence_number: u32) -> Option<&Installment> {
        self.installments
            .iter()
            .find(|i| i.sequence_number == sequence_number)
    }

    /// Sum of `amount` over paid installments.
    pub fn paid_total(&self) -> Decimal {
        self.installments
            .iter()
            .filter(|i| i.is_paid())
            .map(|i| i.amount)
            .sum()
    }

    pub fn scheduled_total(&self) -> Decimal {
        self.installments.iter().map(|i| i.amount).sum()
    }
}
