//! Foundational types shared by every engine component.

pub mod calendar;
pub mod ids;
pub mod money;
pub mod plan;
pub mod rate;
