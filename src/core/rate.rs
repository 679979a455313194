use crate::core::ids::RateId;
use crate::core::money::is_valid_percentage;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two statutory rate families kept in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
    /// Statutory default rate for delayed payments.
    Legal,
    /// Commercial late-payment rate: reference rate plus a statutory surcharge.
    Moratory,
}

impl RateKind {
    pub const ALL: [RateKind; 2] = [RateKind::Legal, RateKind::Moratory];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateKind::Legal => "legal",
            RateKind::Moratory => "moratory",
        }
    }
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legal" => Ok(RateKind::Legal),
            "moratory" => Ok(RateKind::Moratory),
            other => Err(format!("unknown rate kind: {other}")),
        }
    }
}

/// A validity window. `to == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

impl ValidityPeriod {
    pub fn new(from: NaiveDate, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// `true` when `date` falls inside the window (bounds inclusive).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.from <= date && self.to.map_or(true, |to| date <= to)
    }

    /// Whether two windows share at least one day.
    ///
    /// Closed windows overlap when each starts no later than the other
    /// ends; an open end never stops an overlap. The relation is symmetric.
    ///
    /// # Examples
    ///
    /// ```
    /// use repayment_engine::core::rate::ValidityPeriod;
    /// use chrono::NaiveDate;
    ///
    /// let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
    /// let h1 = ValidityPeriod::new(d(1, 1), Some(d(6, 30)));
    /// let h2 = ValidityPeriod::new(d(7, 1), Some(d(12, 31)));
    /// let open = ValidityPeriod::new(d(3, 1), None);
    ///
    /// assert!(!h1.overlaps(&h2));
    /// assert!(open.overlaps(&h1));
    /// assert!(h2.overlaps(&open));
    /// ```
    pub fn overlaps(&self, other: &ValidityPeriod) -> bool {
        let starts_before_other_ends = other.to.map_or(true, |to| self.from <= to);
        let other_starts_before_self_ends = self.to.map_or(true, |to| other.from <= to);
        starts_before_other_ends && other_starts_before_self_ends
    }

    pub fn is_ordered(&self) -> bool {
        self.to.map_or(true, |to| self.from <= to)
    }
}

/// A dated interest-rate record held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRate {
    pub id: RateId,
    pub kind: RateKind,
    /// Annual percentage, two decimals.
    pub percentage: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    /// Legal citation (decree, gazette issue, communiqué).
    pub reference: String,
    pub note: String,
}

impl InterestRate {
    pub fn period(&self) -> ValidityPeriod {
        ValidityPeriod::new(self.valid_from, self.valid_to)
    }
}

/// Field set for creating or replacing a rate record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInterestRate {
    pub kind: RateKind,
    pub percentage: Decimal,
    pub valid_from: NaiveDate,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub note: String,
}

impl NewInterestRate {
    pub fn period(&self) -> ValidityPeriod {
        ValidityPeriod::new(self.valid_from, self.valid_to)
    }

    /// Field-level problems; empty when the record may be stored.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !is_valid_percentage(self.percentage) {
            problems.push(format!(
                "percentage must be between 0 and 100, got {}",
                self.percentage
            ));
        } else if self.percentage.normalize().scale() > 2 {
            problems.push(format!(
                "percentage {} has more than two decimals",
                self.percentage
            ));
        }
        if !self.period().is_ordered() {
            problems.push(format!(
                "valid_from {} is after valid_to {}",
                self.valid_from,
                self.valid_to.map(|d| d.to_string()).unwrap_or_default()
            ));
        }
        problems
    }

    pub fn with_id(self, id: RateId) -> InterestRate {
        InterestRate {
            id,
            kind: self.kind,
            percentage: self.percentage,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            reference: self.reference,
            note: self.note,
        }
    }
}
