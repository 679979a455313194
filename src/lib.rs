//! # repayment-engine
//!
//! Debt-repayment plans and the statutory interest rates they accrue at.
//!
//! Given a principal, a number of monthly installments and optional
//! interest terms, the engine computes an amortization schedule, tracks
//! its payments against an external ledger, and keeps a dated registry of
//! legal and moratory rates fed by a human-approved sourcing pipeline.
//!
//! ## Architecture
//!
//! - **core**: Money rounding, calendar arithmetic, rates, plans, ids
//! - **amortization**: Schedule generation (no interest, italian, french)
//! - **store**: SQLite persistence and the SQLite ledger/history adapters
//! - **registry**: Time-versioned interest-rate registry
//! - **lifecycle**: Plan state machine, collaborators, statistics
//! - **sourcing**: Fetch, parse and classify candidate rates
//! - **monitor**: Expiry, missing-rate and sourcing duties

pub mod amortization;
pub mod config;
pub mod core;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod registry;
pub mod sourcing;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::amortization::schedule::{AmortizationEngine, Schedule, ScheduleRequest};
    pub use crate::core::ids::{CaseId, InstallmentId, PlanId, RateId};
    pub use crate::core::plan::{AmortizationMethod, CloseOutcome, InterestTerms, Plan, PlanState};
    pub use crate::core::rate::{InterestRate, NewInterestRate, RateKind};
    pub use crate::error::{EngineError, Result};
    pub use crate::lifecycle::collaborators::{CaseHistory, Ledger};
    pub use crate::lifecycle::plan_service::{CloseRequest, CreatePlanRequest, PaymentDetails, PlanLifecycle};
    pub use crate::registry::rate_registry::RateRegistry;
    pub use crate::store::Database;
}
