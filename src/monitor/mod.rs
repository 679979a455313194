//! Rate monitoring duties and the notification collaborator.

pub mod notify;
pub mod rate_monitor;
