//! The dated interest-rate registry.

pub mod rate_registry;
