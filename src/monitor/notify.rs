//! The notification collaborator.

use crate::error::CollaboratorError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RateExpiring,
    RateMissing,
    CandidatesPending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub audience: String,
    pub kind: NotificationKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

pub trait Notifier {
    fn notify(&mut self, notification: &Notification) -> Result<(), CollaboratorError>;
}

/// Writes notifications to the log, at a level matching their severity.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, n: &Notification) -> Result<(), CollaboratorError> {
        let level = match n.severity {
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Critical => log::Level::Error,
        };
        log::log!(level, "[{}] {}: {} ({})", n.audience, n.title, n.message, n.metadata);
        Ok(())
    }
}

/// Keeps notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Vec<Notification>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[Notification] {
        &self.sent
    }

    pub fn of_kind(&self, kind: NotificationKind) -> impl Iterator<Item = &Notification> {
        self.sent.iter().filter(move |n| n.kind == kind)
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&mut self, notification: &Notification) -> Result<(), CollaboratorError> {
        self.sent.push(notification.clone());
        Ok(())
    }
}
