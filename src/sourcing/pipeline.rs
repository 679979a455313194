use crate::config::SourcingSettings;
use crate::error::Result;
use crate::registry::rate_registry::RateRegistry;
use crate::sourcing::candidate::{CandidateRate, Disposition, DuplicateCheck};
use crate::sourcing::fetch::{Fetcher, HttpClient, RetryPolicy};
use crate::sourcing::sources::{
    CentralBankSource, LegalReferenceSource, MinistrySource, RateSource, SourceError,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A source that produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Outcome of one sourcing run.
///
/// Always produced, even when every source failed. Serializes to JSON so
/// candidates can be reviewed and approved later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcingReport {
    pub started_at: DateTime<Utc>,
    pub total_fetched: usize,
    pub needs_approval: usize,
    pub skipped_duplicates: usize,
    pub rejected_invalid: usize,
    pub source_errors: Vec<SourceFailure>,
    pub candidates: Vec<CandidateRate>,
}

impl SourcingReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total_fetched: 0,
            needs_approval: 0,
            skipped_duplicates: 0,
            rejected_invalid: 0,
            source_errors: Vec::new(),
            candidates: Vec::new(),
        }
    }

    fn record(&mut self, candidate: CandidateRate) {
        self.total_fetched += 1;
        match candidate.disposition {
            Some(Disposition::NeedsApproval) => self.needs_approval += 1,
            Some(Disposition::SkippedDuplicate) => self.skipped_duplicates += 1,
            Some(Disposition::RejectedInvalid) => self.rejected_invalid += 1,
            None => {}
        }
        self.candidates.push(candidate);
    }

    /// Candidates waiting for a human decision, with their report index.
    pub fn pending(&self) -> impl Iterator<Item = (usize, &CandidateRate)> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.disposition == Some(Disposition::NeedsApproval))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl fmt::Display for SourcingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Sourcing run {} ===", self.started_at.format("%Y-%m-%d %H:%M UTC"))?;
        writeln!(f, "Fetched:         {}", self.total_fetched)?;
        writeln!(f, "Needs approval:  {}", self.needs_approval)?;
        writeln!(f, "Duplicates:      {}", self.skipped_duplicates)?;
        writeln!(f, "Rejected:        {}", self.rejected_invalid)?;
        writeln!(f, "Source errors:   {}", self.source_errors.len())?;
        for (idx, c) in self.candidates.iter().enumerate() {
            writeln!(
                f,
                "  [{idx}] {:<8} {:>7} {} → {}  {:<17} {}",
                c.kind,
                c.percentage.map(|p| format!("{p}%")).unwrap_or_else(|| "-".into()),
                c.valid_from.map(|d| d.to_string()).unwrap_or_else(|| "?".into()),
                c.valid_to.map(|d| d.to_string()).unwrap_or_else(|| "open".into()),
                c.disposition.map(|d| d.as_str()).unwrap_or("unclassified"),
                c.provenance.source,
            )?;
        }
        for failure in &self.source_errors {
            writeln!(f, "  ! {}: {}", failure.source, failure.error)?;
        }
        Ok(())
    }
}

/// Fetches candidates from every source and classifies them against the
/// registry. Never writes to the registry.
pub struct SourcingPipeline {
    sources: Vec<Box<dyn RateSource>>,
    policy: RetryPolicy,
}

impl SourcingPipeline {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            sources: Vec::new(),
            policy,
        }
    }

    /// The central bank, the ministry index and every configured
    /// legal-reference site.
    pub fn from_settings(settings: &SourcingSettings) -> Self {
        let mut pipeline = Self::new(RetryPolicy::from_settings(settings))
            .with_source(CentralBankSource::new(
                &settings.central_bank_url,
                settings.statutory_surcharge_points,
            ))
            .with_source(MinistrySource::new(
                &settings.ministry_index_url,
                settings.ministry_max_pages,
                settings.ministry_max_items,
            ));
        for url in &settings.legal_reference_urls {
            pipeline = pipeline.with_source(LegalReferenceSource::new(url));
        }
        pipeline
    }

    pub fn with_source(mut self, source: impl RateSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, client: &dyn HttpClient, conn: &Connection) -> Result<SourcingReport> {
        let mut report = SourcingReport::new(Utc::now());
        let registry = RateRegistry::new(conn);

        for (name, outcome) in self.fetch_all(client) {
            match outcome {
                Ok(candidates) => {
                    log::debug!("{name}: {} candidates", candidates.len());
                    for mut candidate in candidates {
                        classify(&mut candidate, &registry)?;
                        report.record(candidate);
                    }
                }
                Err(err) => {
                    log::warn!("source {name} failed: {err}");
                    report.source_errors.push(SourceFailure {
                        source: name,
                        error: err.to_string(),
                    });
                }
            }
        }

        log::info!(
            "sourcing run: {} fetched, {} need approval, {} duplicates, {} rejected, {} source errors",
            report.total_fetched,
            report.needs_approval,
            report.skipped_duplicates,
            report.rejected_invalid,
            report.source_errors.len()
        );
        Ok(report)
    }

    /// Every source on its own thread; a slow or failing source does not
    /// hold back the others' results.
    fn fetch_all(&self, client: &dyn HttpClient) -> Vec<(String, std::result::Result<Vec<CandidateRate>, SourceError>)> {
        let fetcher = Fetcher::new(client, self.policy);
        let fetcher = &fetcher;
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .sources
                .iter()
                .map(|source| (source.name().to_string(), scope.spawn(move || source.fetch(fetcher))))
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        Err(SourceError::Parse {
                            url: name.clone(),
                            message: "source panicked".to_string(),
                        })
                    });
                    (name, outcome)
                })
                .collect()
        })
    }
}

/// Validate, then duplicate-check. Invalid candidates are never compared
/// with the registry.
pub fn classify(candidate: &mut CandidateRate, registry: &RateRegistry<'_>) -> Result<Disposition> {
    let validation = candidate.validate();
    let valid = validation.valid;
    candidate.validation = Some(validation);

    let disposition = match (valid, candidate.valid_from) {
        (true, Some(from)) => {
            let existing = registry.find_overlap(candidate.kind, from, candidate.valid_to)?;
            candidate.duplicate = Some(DuplicateCheck {
                is_duplicate: existing.is_some(),
                matched_id: existing.map(|r| r.id),
            });
            if candidate.duplicate.is_some_and(|d| d.is_duplicate) {
                Disposition::SkippedDuplicate
            } else {
                Disposition::NeedsApproval
            }
        }
        _ => Disposition::RejectedInvalid,
    };
    candidate.disposition = Some(disposition);
    Ok(disposition)
}
