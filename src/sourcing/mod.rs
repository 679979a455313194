//! Rate sourcing: fetch candidate rates from external publishers,
//! classify them, and hand them to a human for approval.

pub mod approval;
pub mod candidate;
pub mod fetch;
pub mod parse;
pub mod pipeline;
pub mod sources;
