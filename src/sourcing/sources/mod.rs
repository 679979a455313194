//! One adapter per external publisher.
//!
//! Each adapter knows its own page layout and nothing else; classification
//! against the registry happens in the pipeline.

pub mod central_bank;
pub mod legal_reference;
pub mod ministry;

use crate::sourcing::candidate::{CandidateRate, Provenance};
use crate::sourcing::fetch::{FetchError, Fetcher};
use chrono::Utc;
use thiserror::Error;

pub use central_bank::CentralBankSource;
pub use legal_reference::LegalReferenceSource;
pub use ministry::MinistrySource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("cannot read {url}: {message}")]
    Parse { url: String, message: String },
}

impl SourceError {
    pub fn parse(url: &str, message: impl Into<String>) -> Self {
        SourceError::Parse {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self, http: &Fetcher<'_>) -> Result<Vec<CandidateRate>, SourceError>;
}

pub(crate) fn provenance(source: &str, url: &str, is_official: bool) -> Provenance {
    Provenance {
        source: source.to_string(),
        source_url: url.to_string(),
        fetched_at: Utc::now(),
        is_official,
    }
}
