//! Plan lifecycle and the collaborators it reports to.

pub mod collaborators;
pub mod plan_service;
pub mod statistics;
