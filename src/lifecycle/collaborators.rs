//! Interfaces of the external ledger and case-history systems.

use crate::core::ids::{CaseId, MovementId};
use crate::error::CollaboratorError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Movement kinds the engine posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    PrincipalRecovery,
    InterestRecovery,
    InterestAccrued,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::PrincipalRecovery => "principal_recovery",
            MovementKind::InterestRecovery => "interest_recovery",
            MovementKind::InterestAccrued => "interest_accrued",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "principal_recovery" => Ok(MovementKind::PrincipalRecovery),
            "interest_recovery" => Ok(MovementKind::InterestRecovery),
            "interest_accrued" => Ok(MovementKind::InterestAccrued),
            other => Err(format!("unknown movement kind: {other}")),
        }
    }
}

/// A financial movement as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub case_id: CaseId,
    pub kind: MovementKind,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub memo: String,
}

/// The financial-ledger collaborator.
pub trait Ledger {
    fn post_movement(
        &mut self,
        case_id: CaseId,
        kind: MovementKind,
        amount: Decimal,
        date: NaiveDate,
        memo: &str,
    ) -> Result<MovementId, CollaboratorError>;

    fn delete_movement(&mut self, id: MovementId) -> Result<(), CollaboratorError>;

    /// Put back a previously deleted movement under its original id.
    fn restore_movement(&mut self, movement: &Movement) -> Result<(), CollaboratorError>;

    fn find_movement(&self, id: MovementId) -> Result<Option<Movement>, CollaboratorError>;
}

/// Event types appended to a case's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PlanCreated,
    PlanPayment,
    PlanReversal,
    PlanInstallmentUpdated,
    PlanClosed,
    PlanReopened,
    PlanRecoveredAmountPosted,
    PlanDeleted,
    MovementInserted,
    MovementDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PlanCreated => "plan_created",
            EventType::PlanPayment => "plan_payment",
            EventType::PlanReversal => "plan_reversal",
            EventType::PlanInstallmentUpdated => "plan_installment_updated",
            EventType::PlanClosed => "plan_closed",
            EventType::PlanReopened => "plan_reopened",
            EventType::PlanRecoveredAmountPosted => "plan_recovered_amount_posted",
            EventType::PlanDeleted => "plan_deleted",
            EventType::MovementInserted => "movement_inserted",
            EventType::MovementDeleted => "movement_deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The case-history collaborator.
pub trait CaseHistory {
    fn append_event(
        &mut self,
        case_id: CaseId,
        event_type: EventType,
        payload: &serde_json::Value,
        actor: Option<&str>,
    ) -> Result<(), CollaboratorError>;
}

/// In-process ledger.
///
/// Can be told to fail after a number of successful posts or deletes,
/// which is how tests exercise compensation of partially applied
/// transitions.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    movements: BTreeMap<MovementId, Movement>,
    posts_before_failure: Option<usize>,
    deletes_before_failure: Option<usize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every post after the next `posts` successful ones.
    pub fn fail_after(mut self, posts: usize) -> Self {
        self.posts_before_failure = Some(posts);
        self
    }

    /// Fail every delete after the next `deletes` successful ones.
    pub fn fail_deletes_after(mut self, deletes: usize) -> Self {
        self.deletes_before_failure = Some(deletes);
        self
    }

    pub fn contains(&self, id: MovementId) -> bool {
        self.movements.contains_key(&id)
    }

    pub fn movements(&self) -> impl Iterator<Item = &Movement> {
        self.movements.values()
    }

    pub fn len(&self) -> usize {
        self.movements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// Sum of movement amounts of `kind` for `case_id`.
    pub fn total(&self, case_id: CaseId, kind: MovementKind) -> Decimal {
        self.movements
            .values()
            .filter(|m| m.case_id == case_id && m.kind == kind)
            .map(|m| m.amount)
            .sum()
    }
}

impl Ledger for MemoryLedger {
    fn post_movement(
        &mut self,
        case_id: CaseId,
        kind: MovementKind,
        amount: Decimal,
        date: NaiveDate,
        memo: &str,
    ) -> Result<MovementId, CollaboratorError> {
        if let Some(remaining) = self.posts_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(CollaboratorError::new("ledger", "posting unavailable"));
            }
            *remaining -= 1;
        }
        let id = MovementId::new_v4();
        self.movements.insert(
            id,
            Movement {
                id,
                case_id,
                kind,
                amount,
                date,
                memo: memo.to_string(),
            },
        );
        Ok(id)
    }

    fn delete_movement(&mut self, id: MovementId) -> Result<(), CollaboratorError> {
        if let Some(remaining) = self.deletes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(CollaboratorError::new("ledger", "deletion unavailable"));
            }
            *remaining -= 1;
        }
        self.movements
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CollaboratorError::new("ledger", format!("movement {id} not found")))
    }

    fn restore_movement(&mut self, movement: &Movement) -> Result<(), CollaboratorError> {
        self.movements.insert(movement.id, movement.clone());
        Ok(())
    }

    fn find_movement(&self, id: MovementId) -> Result<Option<Movement>, CollaboratorError> {
        Ok(self.movements.get(&id).cloned())
    }
}

/// A recorded history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub case_id: CaseId,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub actor: Option<String>,
}

/// In-process case history.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    events: Vec<HistoryEvent>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn of_type(&self, event_type: EventType) -> impl Iterator<Item = &HistoryEvent> {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }
}

impl CaseHistory for MemoryHistory {
    fn append_event(
        &mut self,
        case_id: CaseId,
        event_type: EventType,
        payload: &serde_json::Value,
        actor: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        self.events.push(HistoryEvent {
            case_id,
            event_type,
            payload: payload.clone(),
            actor: actor.map(str::to_string),
        });
        Ok(())
    }
}
