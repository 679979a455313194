use crate::core::ids::RateId;
use crate::core::money::{is_valid_percentage, round2};
use crate::core::rate::{NewInterestRate, RateKind};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a candidate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    /// Published by the issuing authority, as opposed to a secondary site.
    pub is_official: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub matched_id: Option<RateId>,
}

/// Classification of a candidate after a sourcing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    NeedsApproval,
    SkippedDuplicate,
    RejectedInvalid,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::NeedsApproval => "needs_approval",
            Disposition::SkippedDuplicate => "skipped_duplicate",
            Disposition::RejectedInvalid => "rejected_invalid",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate extracted from an external source, pending human review.
///
/// Percentage and start date are optional because a page may yield only
/// part of a record; such candidates are rejected at validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRate {
    pub kind: RateKind,
    pub percentage: Option<Decimal>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub reference: String,
    pub note: String,
    pub provenance: Provenance,
    #[serde(default)]
    pub validation: Option<ValidationResult>,
    #[serde(default)]
    pub duplicate: Option<DuplicateCheck>,
    #[serde(default)]
    pub disposition: Option<Disposition>,
}

impl CandidateRate {
    pub fn new(kind: RateKind, provenance: Provenance) -> Self {
        Self {
            kind,
            percentage: None,
            valid_from: None,
            valid_to: None,
            reference: String::new(),
            note: String::new(),
            provenance,
            validation: None,
            duplicate: None,
            disposition: None,
        }
    }

    pub fn with_window(mut self, (from, to): (NaiveDate, NaiveDate)) -> Self {
        self.valid_from = Some(from);
        self.valid_to = Some(to);
        self
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match self.percentage {
            None => errors.push("percentage is missing".to_string()),
            Some(p) if !is_valid_percentage(p) => {
                errors.push(format!("percentage must be between 0 and 100, got {p}"))
            }
            Some(p) if p.normalize().scale() > 2 => {
                warnings.push(format!("percentage {p} will be rounded to two decimals"))
            }
            Some(_) => {}
        }
        match (self.valid_from, self.valid_to) {
            (None, _) => errors.push("valid_from is missing".to_string()),
            (Some(from), Some(to)) if from > to => {
                errors.push(format!("valid_from {from} is after valid_to {to}"))
            }
            (Some(_), None) => warnings.push("validity is open-ended".to_string()),
            _ => {}
        }
        if !self.provenance.is_official {
            warnings.push(format!(
                "{} is a secondary source; check the official text",
                self.provenance.source
            ));
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// The registry record this candidate would become.
    pub fn to_new_rate(&self) -> Result<NewInterestRate> {
        let percentage = self
            .percentage
            .ok_or_else(|| EngineError::Validation("candidate has no percentage".to_string()))?;
        let valid_from = self
            .valid_from
            .ok_or_else(|| EngineError::Validation("candidate has no start date".to_string()))?;
        let note = if self.note.is_empty() {
            format!("sourced from {}", self.provenance.source_url)
        } else {
            format!("{} (sourced from {})", self.note, self.provenance.source_url)
        };
        Ok(NewInterestRate {
            kind: self.kind,
            percentage: round2(percentage),
            valid_from,
            valid_to: self.valid_to,
            reference: self.reference.clone(),
            note,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn candidate(percentage: Option<Decimal>) -> CandidateRate {
        let mut c = CandidateRate::new(
            RateKind::Legal,
            Provenance {
                source: "test".into(),
                source_url: "https://example.org/rate".into(),
                fetched_at: Utc::now(),
                is_official: true,
            },
        )
        .with_window((d(2025, 1, 1), d(2025, 12, 31)));
        c.percentage = percentage;
        c
    }

    #[test]
    fn test_valid_candidate() {
        let result = candidate(Some(dec!(2.00))).validate();
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_out_of_range_percentage() {
        let result = candidate(Some(dec!(150))).validate();
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_missing_fields() {
        let mut c = candidate(None);
        c.valid_from = None;
        let result = c.validate();
        assert_eq!(result.errors.len(), 2);
        assert!(c.to_new_rate().is_err());
    }

    #[test]
    fn test_reversed_window() {
        let mut c = candidate(Some(dec!(2)));
        c.valid_to = Some(d(2024, 1, 1));
        assert!(!c.validate().valid);
    }

    #[test]
    fn test_secondary_source_warns() {
        let mut c = candidate(Some(dec!(2)));
        c.provenance.is_official = false;
        let result = c.validate();
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_to_new_rate_rounds_and_cites() {
        let rate = candidate(Some(dec!(2.505))).to_new_rate().unwrap();
        assert_eq!(rate.percentage, dec!(2.51));
        assert!(rate.note.contains("https://example.org/rate"));
    }
}
