//! Scheduled checks over the rate registry.
//!
//! Each duty is a plain function run by an external scheduler. Duties only
//! read the registry and send notifications, so running one twice, or two
//! at once, is harmless.

use crate::config::MonitorSettings;
use crate::core::calendar::days_between;
use crate::core::rate::RateKind;
use crate::error::Result;
use crate::monitor::notify::{Notification, NotificationKind, Notifier, Severity};
use crate::registry::rate_registry::RateRegistry;
use crate::sourcing::fetch::HttpClient;
use crate::sourcing::pipeline::{SourcingPipeline, SourcingReport};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

const AUDIENCE: &str = "rate-administrators";

/// What one duty looked at and what it sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub scanned: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
}

pub struct RateMonitor<N: Notifier> {
    notifier: N,
    settings: MonitorSettings,
}

impl<N: Notifier> RateMonitor<N> {
    pub fn new(notifier: N, settings: MonitorSettings) -> Self {
        Self { notifier, settings }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Daily: one notification per record whose window ends within the horizon.
    pub fn run_expiry_check(&mut self, conn: &Connection, today: NaiveDate) -> Result<MonitorReport> {
        let horizon = self.settings.expiry_horizon_days;
        let expiring = RateRegistry::new(conn).expiring_within(today, horizon)?;
        let mut report = MonitorReport {
            scanned: expiring.len(),
            ..MonitorReport::default()
        };

        for rate in &expiring {
            let Some(valid_to) = rate.valid_to else { continue };
            let days_left = days_between(today, valid_to);
            self.send(
                &mut report,
                Notification {
                    audience: AUDIENCE.to_string(),
                    kind: NotificationKind::RateExpiring,
                    severity: Severity::Warning,
                    title: format!("{} rate expiring", rate.kind),
                    message: format!(
                        "{} rate {}% (record {}) expires on {valid_to}, in {days_left} days",
                        rate.kind, rate.percentage, rate.id
                    ),
                    metadata: json!({
                        "rate_id": rate.id,
                        "kind": rate.kind,
                        "valid_to": valid_to,
                        "days_left": days_left,
                    }),
                },
            );
        }
        log::info!(
            "expiry check: {} records within {horizon} days, {} notified",
            report.scanned,
            report.notifications_sent
        );
        Ok(report)
    }

    /// Weekly: a critical notification per kind with no resolvable record today.
    pub fn run_missing_rate_check(&mut self, conn: &Connection, today: NaiveDate) -> Result<MonitorReport> {
        let registry = RateRegistry::new(conn);
        let mut report = MonitorReport::default();

        for kind in RateKind::ALL {
            report.scanned += 1;
            if registry.resolve(kind, today)?.is_some() {
                continue;
            }
            self.send(
                &mut report,
                Notification {
                    audience: AUDIENCE.to_string(),
                    kind: NotificationKind::RateMissing,
                    severity: Severity::Critical,
                    title: format!("No {kind} rate in force"),
                    message: format!("no {kind} rate covers {today}; plans using it cannot be created"),
                    metadata: json!({ "kind": kind, "date": today }),
                },
            );
        }
        log::info!("missing-rate check: {} kinds missing", report.notifications_sent + report.notification_failures);
        Ok(report)
    }

    /// Trigger a sourcing run. Nothing is written to the registry; when
    /// candidates need approval the administrators are told so.
    ///
    /// Returns `None` when the scheduled trigger is disabled.
    pub fn run_sourcing(
        &mut self,
        pipeline: &SourcingPipeline,
        client: &dyn HttpClient,
        conn: &Connection,
        enabled: bool,
    ) -> Result<Option<SourcingReport>> {
        if !enabled {
            log::info!("scheduled sourcing is disabled");
            return Ok(None);
        }
        let sourcing = pipeline.run(client, conn)?;
        if sourcing.needs_approval > 0 {
            let mut report = MonitorReport::default();
            self.send(
                &mut report,
                Notification {
                    audience: AUDIENCE.to_string(),
                    kind: NotificationKind::CandidatesPending,
                    severity: Severity::Info,
                    title: "Interest rates awaiting approval".to_string(),
                    message: format!(
                        "{} candidate rates need approval ({} source errors)",
                        sourcing.needs_approval,
                        sourcing.source_errors.len()
                    ),
                    metadata: json!({
                        "needs_approval": sourcing.needs_approval,
                        "skipped_duplicates": sourcing.skipped_duplicates,
                        "rejected_invalid": sourcing.rejected_invalid,
                        "source_errors": sourcing.source_errors.len(),
                    }),
                },
            );
        }
        Ok(Some(sourcing))
    }

    fn send(&mut self, report: &mut MonitorReport, notification: Notification) {
        match self.notifier.notify(&notification) {
            Ok(()) => {
                log::info!("notified {}: {}", notification.audience, notification.title);
                report.notifications_sent += 1;
            }
            Err(e) => {
                log::error!("could not send '{}': {e}", notification.title);
                report.notification_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::NewInterestRate;
    use crate::monitor::notify::MemoryNotifier;
    use crate::store::Database;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn seed(db: &Database, kind: RateKind, from: NaiveDate, to: Option<NaiveDate>) {
        RateRegistry::new(db.connection())
            .create(&NewInterestRate {
                kind,
                percentage: dec!(2.5),
                valid_from: from,
                valid_to: to,
                reference: String::new(),
                note: String::new(),
            })
            .unwrap();
    }

    fn monitor() -> RateMonitor<MemoryNotifier> {
        RateMonitor::new(MemoryNotifier::new(), MonitorSettings::default())
    }

    #[test]
    fn test_expiry_check_notifies_per_record() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, RateKind::Legal, d(2025, 1, 1), Some(d(2025, 12, 31)));
        seed(&db, RateKind::Moratory, d(2025, 7, 1), Some(d(2025, 12, 20)));
        seed(&db, RateKind::Moratory, d(2026, 1, 1), Some(d(2026, 6, 30)));

        let mut m = monitor();
        let report = m.run_expiry_check(db.connection(), d(2025, 12, 10)).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.notifications_sent, 2);
        assert_eq!(m.notifier().of_kind(NotificationKind::RateExpiring).count(), 2);

        // Running again sends the same notifications again and changes nothing.
        let again = m.run_expiry_check(db.connection(), d(2025, 12, 10)).unwrap();
        assert_eq!(again, report);
    }

    #[test]
    fn test_missing_rate_check() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, RateKind::Moratory, d(2024, 1, 1), Some(d(2024, 6, 30)));

        let mut m = monitor();
        let report = m.run_missing_rate_check(db.connection(), d(2025, 3, 1)).unwrap();
        // Moratory falls back to the expired record; legal has nothing.
        assert_eq!(report.scanned, 2);
        assert_eq!(report.notifications_sent, 1);
        let sent = &m.notifier().sent()[0];
        assert_eq!(sent.severity, Severity::Critical);
        assert_eq!(sent.metadata["kind"], "legal");
    }

    #[test]
    fn test_disabled_sourcing_does_nothing() {
        struct Unreachable;
        impl HttpClient for Unreachable {
            fn get(&self, url: &str) -> std::result::Result<String, crate::sourcing::fetch::FetchError> {
                panic!("unexpected fetch of {url}");
            }
        }
        let db = Database::open_in_memory().unwrap();
        let pipeline = SourcingPipeline::from_settings(&Default::default());
        let result = monitor()
            .run_sourcing(&pipeline, &Unreachable, db.connection(), false)
            .unwrap();
        assert!(result.is_none());
    }
}
