use crate::core::ids::RateId;
use crate::core::rate::{InterestRate, NewInterestRate, RateKind, ValidityPeriod};
use crate::error::{EngineError, Result};
use crate::store::rates;
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

/// The rates in force on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentRates {
    pub on: NaiveDate,
    pub legal: Option<InterestRate>,
    pub moratory: Option<InterestRate>,
}

/// Time-versioned store of legal and moratory rates.
///
/// Borrowed over a connection or an open transaction, so plan creation
/// can resolve its rate inside the same transaction that writes the plan.
///
/// # Examples
///
/// ```
/// use repayment_engine::core::rate::{NewInterestRate, RateKind};
/// use repayment_engine::registry::rate_registry::RateRegistry;
/// use repayment_engine::store::Database;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let db = Database::open_in_memory().unwrap();
/// let registry = RateRegistry::new(db.connection());
/// let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
///
/// registry.create(&NewInterestRate {
///     kind: RateKind::Moratory,
///     percentage: dec!(12.50),
///     valid_from: d(2024, 1, 1),
///     valid_to: Some(d(2024, 6, 30)),
///     reference: "GU 2024".into(),
///     note: String::new(),
/// }).unwrap();
///
/// // Past the window, the moratory rate stays in force.
/// let rate = registry.resolve(RateKind::Moratory, d(2024, 9, 1)).unwrap().unwrap();
/// assert_eq!(rate.percentage, dec!(12.50));
/// ```
pub struct RateRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> RateRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// The record of `kind` in force on `on`.
    ///
    /// Among covering records the latest `valid_from` wins. Moratory rates
    /// stay in force until superseded, so when no window covers `on` the
    /// latest moratory record started on or before `on` is returned. Legal
    /// rates have no such fallback.
    pub fn resolve(&self, kind: RateKind, on: NaiveDate) -> Result<Option<InterestRate>> {
        if let Some(rate) = rates::covering(self.conn, kind, on)? {
            return Ok(Some(rate));
        }
        match kind {
            RateKind::Legal => Ok(None),
            RateKind::Moratory => {
                let fallback = rates::latest_started(self.conn, kind, on)?;
                if let Some(rate) = &fallback {
                    log::debug!(
                        "moratory rate on {} falls back to record {} from {}",
                        on,
                        rate.id,
                        rate.valid_from
                    );
                }
                Ok(fallback)
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but absence is an error.
    pub fn require(&self, kind: RateKind, on: NaiveDate) -> Result<InterestRate> {
        self.resolve(kind, on)?
            .ok_or(EngineError::MissingRate { kind, on })
    }

    /// Resolved legal and moratory records for `on`.
    pub fn current_rates(&self, on: NaiveDate) -> Result<CurrentRates> {
        Ok(CurrentRates {
            on,
            legal: self.resolve(RateKind::Legal, on)?,
            moratory: self.resolve(RateKind::Moratory, on)?,
        })
    }

    /// The first existing record of `kind` whose window overlaps `[from, to]`.
    pub fn find_overlap(
        &self,
        kind: RateKind,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Result<Option<InterestRate>> {
        self.find_overlap_excluding(kind, ValidityPeriod::new(from, to), None)
    }

    fn find_overlap_excluding(
        &self,
        kind: RateKind,
        period: ValidityPeriod,
        exclude: Option<RateId>,
    ) -> Result<Option<InterestRate>> {
        let mut candidates = rates::list(self.conn, Some(kind))?;
        // oldest first, so the earliest conflicting record is reported
        candidates.reverse();
        Ok(candidates
            .into_iter()
            .filter(|r| Some(r.id) != exclude)
            .find(|r| period.overlaps(&r.period())))
    }

    pub fn list(&self, kind: Option<RateKind>) -> Result<Vec<InterestRate>> {
        Ok(rates::list(self.conn, kind)?)
    }

    pub fn get(&self, id: RateId) -> Result<InterestRate> {
        rates::get(self.conn, id)?.ok_or_else(|| EngineError::not_found("interest rate", id))
    }

    /// Store a new record; overlapping an existing window of the same kind is a conflict.
    pub fn create(&self, rate: &NewInterestRate) -> Result<InterestRate> {
        validate(rate)?;
        if let Some(existing) = self.find_overlap_excluding(rate.kind, rate.period(), None)? {
            return Err(overlap_conflict(rate, &existing));
        }
        let id = rates::insert(self.conn, rate)?;
        log::info!(
            "created {} rate {} ({}% from {})",
            rate.kind,
            id,
            rate.percentage,
            rate.valid_from
        );
        Ok(rate.clone().with_id(id))
    }

    /// Replace record `id` in place.
    pub fn update(&self, id: RateId, rate: &NewInterestRate) -> Result<InterestRate> {
        validate(rate)?;
        if let Some(existing) = self.find_overlap_excluding(rate.kind, rate.period(), Some(id))? {
            return Err(overlap_conflict(rate, &existing));
        }
        if !rates::update(self.conn, id, rate)? {
            return Err(EngineError::not_found("interest rate", id));
        }
        log::info!("updated {} rate {}", rate.kind, id);
        Ok(rate.clone().with_id(id))
    }

    pub fn delete(&self, id: RateId) -> Result<()> {
        if !rates::delete(self.conn, id)? {
            return Err(EngineError::not_found("interest rate", id));
        }
        log::info!("deleted rate {}", id);
        Ok(())
    }

    /// Records whose `valid_to` falls within `horizon_days` from `today` (inclusive).
    pub fn expiring_within(&self, today: NaiveDate, horizon_days: i64) -> Result<Vec<InterestRate>> {
        let until = today + Duration::days(horizon_days);
        Ok(rates::ending_between(self.conn, today, until)?)
    }
}

fn validate(rate: &NewInterestRate) -> Result<()> {
    let problems = rate.problems();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(problems.join("; ")))
    }
}

fn overlap_conflict(rate: &NewInterestRate, existing: &InterestRate) -> EngineError {
    EngineError::Conflict(format!(
        "{} rate from {} overlaps record {} ({} to {})",
        rate.kind,
        rate.valid_from,
        existing.id,
        existing.valid_from,
        existing
            .valid_to
            .map(|d| d.to_string())
            .unwrap_or_else(|| "open".to_string())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rate(kind: RateKind, pct: Decimal, from: NaiveDate, to: Option<NaiveDate>) -> NewInterestRate {
        NewInterestRate {
            kind,
            percentage: pct,
            valid_from: from,
            valid_to: to,
            reference: String::new(),
            note: String::new(),
        }
    }

    #[test]
    fn test_resolve_legal_has_no_fallback() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        registry
            .create(&rate(RateKind::Legal, dec!(5), d(2023, 1, 1), Some(d(2023, 12, 31))))
            .unwrap();

        assert!(registry.resolve(RateKind::Legal, d(2023, 6, 1)).unwrap().is_some());
        assert!(registry.resolve(RateKind::Legal, d(2024, 2, 1)).unwrap().is_none());
        assert!(matches!(
            registry.require(RateKind::Legal, d(2024, 2, 1)),
            Err(EngineError::MissingRate { kind: RateKind::Legal, .. })
        ));
    }

    #[test]
    fn test_resolve_moratory_falls_back_to_latest_started() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        registry
            .create(&rate(RateKind::Moratory, dec!(12.0), d(2023, 7, 1), Some(d(2023, 12, 31))))
            .unwrap();
        registry
            .create(&rate(RateKind::Moratory, dec!(12.5), d(2024, 1, 1), Some(d(2024, 6, 30))))
            .unwrap();

        let resolved = registry.resolve(RateKind::Moratory, d(2024, 10, 1)).unwrap().unwrap();
        assert_eq!(resolved.percentage, dec!(12.5));
        // nothing started before the first record
        assert!(registry.resolve(RateKind::Moratory, d(2023, 1, 1)).unwrap().is_none());
    }

    #[test]
    fn test_resolve_prefers_latest_start_among_covering() {
        let db = Database::open_in_memory().unwrap();
        // bypass create() to store two overlapping records
        rates::insert(db.connection(), &rate(RateKind::Legal, dec!(1), d(2020, 1, 1), None)).unwrap();
        rates::insert(db.connection(), &rate(RateKind::Legal, dec!(2), d(2024, 1, 1), None)).unwrap();
        let registry = RateRegistry::new(db.connection());
        assert_eq!(
            registry.resolve(RateKind::Legal, d(2024, 5, 1)).unwrap().unwrap().percentage,
            dec!(2)
        );
    }

    #[test]
    fn test_create_rejects_overlap_and_invalid() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        registry
            .create(&rate(RateKind::Legal, dec!(2.5), d(2024, 1, 1), Some(d(2024, 12, 31))))
            .unwrap();

        let overlapping = rate(RateKind::Legal, dec!(3), d(2024, 6, 1), None);
        assert!(matches!(registry.create(&overlapping), Err(EngineError::Conflict(_))));

        // same window, other kind: fine
        registry
            .create(&rate(RateKind::Moratory, dec!(12), d(2024, 1, 1), Some(d(2024, 6, 30))))
            .unwrap();

        let invalid = rate(RateKind::Legal, dec!(150), d(2026, 1, 1), None);
        assert!(matches!(registry.create(&invalid), Err(EngineError::Validation(_))));

        let too_precise = rate(RateKind::Legal, dec!(2.555), d(2026, 1, 1), None);
        assert!(matches!(registry.create(&too_precise), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_find_overlap_open_ended_existing() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        let open = registry
            .create(&rate(RateKind::Legal, dec!(2.5), d(2024, 1, 1), None))
            .unwrap();

        let hit = registry
            .find_overlap(RateKind::Legal, d(2030, 1, 1), Some(d(2030, 12, 31)))
            .unwrap();
        assert_eq!(hit.map(|r| r.id), Some(open.id));
        assert!(registry
            .find_overlap(RateKind::Legal, d(2023, 1, 1), Some(d(2023, 12, 31)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_ignores_own_window() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        let created = registry
            .create(&rate(RateKind::Legal, dec!(2.5), d(2024, 1, 1), Some(d(2024, 12, 31))))
            .unwrap();
        let updated = registry
            .update(created.id, &rate(RateKind::Legal, dec!(2.0), d(2024, 1, 1), Some(d(2024, 12, 31))))
            .unwrap();
        assert_eq!(updated.percentage, dec!(2.0));
        assert!(matches!(
            registry.update(created.id, &rate(RateKind::Legal, dec!(2.125), d(2024, 1, 1), None)),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            registry.update(RateId::new(999), &rate(RateKind::Legal, dec!(1), d(2030, 1, 1), None)),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_and_expiring() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        let soon = registry
            .create(&rate(RateKind::Legal, dec!(2.5), d(2024, 1, 1), Some(d(2024, 12, 31))))
            .unwrap();
        registry
            .create(&rate(RateKind::Moratory, dec!(12), d(2024, 7, 1), None))
            .unwrap();

        let expiring = registry.expiring_within(d(2024, 12, 10), 30).unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, soon.id);
        assert!(registry.expiring_within(d(2024, 10, 1), 30).unwrap().is_empty());

        registry.delete(soon.id).unwrap();
        assert!(matches!(registry.delete(soon.id), Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn test_current_rates() {
        let db = Database::open_in_memory().unwrap();
        let registry = RateRegistry::new(db.connection());
        registry
            .create(&rate(RateKind::Legal, dec!(2.5), d(2024, 1, 1), Some(d(2024, 12, 31))))
            .unwrap();
        let current = registry.current_rates(d(2024, 3, 3)).unwrap();
        assert!(current.legal.is_some());
        assert!(current.moratory.is_none());
    }
}
