//! SQLite-backed ledger and case-history adapters.
//!
//! These keep movements and events in a journal database of their own,
//! separate from the engine store, so a lifecycle transaction on the
//! engine store never waits on a journal write lock.

use super::{decimal_column, decimal_to_sql, parsed_column};
use crate::core::ids::{CaseId, MovementId};
use crate::error::CollaboratorError;
use crate::lifecycle::collaborators::{CaseHistory, EventType, Ledger, Movement, MovementKind};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ledger_movements (
    id TEXT PRIMARY KEY,
    case_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    amount TEXT NOT NULL,
    date TEXT NOT NULL,
    memo TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS case_events (
    id INTEGER PRIMARY KEY,
    case_id INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    actor TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

fn open_journal(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn ledger_error(err: rusqlite::Error) -> CollaboratorError {
    CollaboratorError::new("ledger", err.to_string())
}

/// Ledger movements persisted in the journal database.
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Ok(Self {
            conn: open_journal(path)?,
        })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn insert(&self, movement: &Movement) -> Result<(), CollaboratorError> {
        self.conn
            .execute(
                "INSERT INTO ledger_movements (id, case_id, kind, amount, date, memo)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    movement.id.to_string(),
                    movement.case_id.get(),
                    movement.kind.as_str(),
                    decimal_to_sql(movement.amount),
                    movement.date,
                    movement.memo
                ],
            )
            .map_err(ledger_error)?;
        Ok(())
    }

    /// Movements of `case_id`, oldest first.
    pub fn movements_for_case(&self, case_id: CaseId) -> rusqlite::Result<Vec<Movement>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, kind, amount, date, memo FROM ledger_movements
             WHERE case_id = ?1 ORDER BY date, created_at",
        )?;
        let rows = stmt.query_map(params![case_id.get()], movement_from_row)?;
        rows.collect()
    }
}

fn movement_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Movement> {
    Ok(Movement {
        id: parsed_column(row, 0)?,
        case_id: CaseId::new(row.get(1)?),
        kind: parsed_column(row, 2)?,
        amount: decimal_column(row, 3)?,
        date: row.get(4)?,
        memo: row.get(5)?,
    })
}

impl Ledger for SqliteLedger {
    fn post_movement(
        &mut self,
        case_id: CaseId,
        kind: MovementKind,
        amount: Decimal,
        date: NaiveDate,
        memo: &str,
    ) -> Result<MovementId, CollaboratorError> {
        let movement = Movement {
            id: MovementId::new_v4(),
            case_id,
            kind,
            amount,
            date,
            memo: memo.to_string(),
        };
        self.insert(&movement)?;
        Ok(movement.id)
    }

    fn delete_movement(&mut self, id: MovementId) -> Result<(), CollaboratorError> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM ledger_movements WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(ledger_error)?;
        if changed == 0 {
            return Err(CollaboratorError::new("ledger", format!("movement {id} not found")));
        }
        Ok(())
    }

    fn restore_movement(&mut self, movement: &Movement) -> Result<(), CollaboratorError> {
        self.insert(movement)
    }

    fn find_movement(&self, id: MovementId) -> Result<Option<Movement>, CollaboratorError> {
        self.conn
            .query_row(
                "SELECT id, case_id, kind, amount, date, memo FROM ledger_movements WHERE id = ?1",
                params![id.to_string()],
                movement_from_row,
            )
            .optional()
            .map_err(ledger_error)
    }
}

/// Case-history events persisted in the journal database.
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Ok(Self {
            conn: open_journal(path)?,
        })
    }

    /// `(event_type, payload)` pairs of `case_id`, oldest first.
    pub fn events_for_case(&self, case_id: CaseId) -> rusqlite::Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type, payload FROM case_events WHERE case_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![case_id.get()], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }
}

impl CaseHistory for SqliteHistory {
    fn append_event(
        &mut self,
        case_id: CaseId,
        event_type: EventType,
        payload: &serde_json::Value,
        actor: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        self.conn
            .execute(
                "INSERT INTO case_events (case_id, event_type, payload, actor) VALUES (?1, ?2, ?3, ?4)",
                params![case_id.get(), event_type.as_str(), payload.to_string(), actor],
            )
            .map_err(|e| CollaboratorError::new("case history", e.to_string()))?;
        Ok(())
    }
}
