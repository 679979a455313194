//! Amortization schedule generation.
//!
//! Pure functions: no storage, no clock. The plan lifecycle calls into
//! this module after it has resolved the rate to apply.

pub mod schedule;
