use super::{provenance, RateSource, SourceError};
use crate::core::calendar::year_window;
use crate::core::rate::RateKind;
use crate::sourcing::candidate::CandidateRate;
use crate::sourcing::fetch::Fetcher;
use crate::sourcing::parse::{find_effective_date, percentage_after, strip_html};

const KEYWORDS: [&str; 3] = [
    "tasso di interesse legale",
    "saggio degli interessi legali",
    "interesse legale",
];

/// A secondary legal-reference site reporting the legal rate.
///
/// Results are never official, so every candidate carries a warning.
pub struct LegalReferenceSource {
    name: String,
    url: String,
}

impl LegalReferenceSource {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let host = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.clone());
        Self {
            name: format!("legal-reference:{host}"),
            url,
        }
    }

    pub fn extract(&self, html: &str) -> Result<CandidateRate, SourceError> {
        let text = strip_html(html);
        let percentage = percentage_after(&text, &KEYWORDS)
            .ok_or_else(|| SourceError::parse(&self.url, "legal rate not found"))?;

        let mut candidate = CandidateRate::new(RateKind::Legal, provenance(&self.name, &self.url, false));
        candidate.percentage = Some(percentage);
        candidate.reference = "art. 1284 c.c.".to_string();
        if let Some(date) = find_effective_date(&text) {
            candidate = candidate.with_window(year_window(date));
        }
        Ok(candidate)
    }
}

impl RateSource for LegalReferenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, http: &Fetcher<'_>) -> Result<Vec<CandidateRate>, SourceError> {
        let html = http.get(&self.url)?;
        Ok(vec![self.extract(&html)?])
    }
}
