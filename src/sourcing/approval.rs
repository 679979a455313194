//! The human approval step between a candidate and the registry.

use crate::core::ids::RateId;
use crate::core::rate::InterestRate;
use crate::error::{EngineError, Result};
use crate::registry::rate_registry::RateRegistry;
use crate::sourcing::candidate::{CandidateRate, Disposition};

/// Store `candidate` as a new registry record.
pub fn approve(registry: &RateRegistry<'_>, candidate: &CandidateRate) -> Result<InterestRate> {
    ensure_not_rejected(candidate)?;
    let rate = registry.create(&candidate.to_new_rate()?)?;
    log::info!(
        "approved {} candidate from {} as rate {}",
        candidate.kind,
        candidate.provenance.source,
        rate.id
    );
    Ok(rate)
}

/// Replace registry record `existing` with `candidate`.
pub fn overwrite(registry: &RateRegistry<'_>, existing: RateId, candidate: &CandidateRate) -> Result<InterestRate> {
    ensure_not_rejected(candidate)?;
    let current = registry.get(existing)?;
    if current.kind != candidate.kind {
        return Err(EngineError::Validation(format!(
            "rate {existing} is a {} rate, candidate is {}",
            current.kind, candidate.kind
        )));
    }
    let rate = registry.update(existing, &candidate.to_new_rate()?)?;
    log::info!(
        "overwrote rate {existing} with candidate from {}",
        candidate.provenance.source
    );
    Ok(rate)
}

fn ensure_not_rejected(candidate: &CandidateRate) -> Result<()> {
    if candidate.disposition == Some(Disposition::RejectedInvalid) {
        let errors = candidate
            .validation
            .as_ref()
            .map(|v| v.errors.join("; "))
            .unwrap_or_default();
        return Err(EngineError::Validation(format!(
            "candidate was rejected: {errors}"
        )));
    }
    Ok(())
}
