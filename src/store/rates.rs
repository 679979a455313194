//! Row mapping for `interest_rates`.

use super::{decimal_column, decimal_to_sql, parsed_column};
use crate::core::ids::RateId;
use crate::core::rate::{InterestRate, NewInterestRate, RateKind};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, kind, percentage, valid_from, valid_to, reference, note";

fn from_row(row: &Row<'_>) -> rusqlite::Result<InterestRate> {
    Ok(InterestRate {
        id: RateId::new(row.get(0)?),
        kind: parsed_column(row, 1)?,
        percentage: decimal_column(row, 2)?,
        valid_from: row.get(3)?,
        valid_to: row.get(4)?,
        reference: row.get(5)?,
        note: row.get(6)?,
    })
}

pub fn insert(conn: &Connection, rate: &NewInterestRate) -> rusqlite::Result<RateId> {
    conn.execute(
        "INSERT INTO interest_rates (kind, percentage, valid_from, valid_to, reference, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rate.kind.as_str(),
            decimal_to_sql(rate.percentage),
            rate.valid_from,
            rate.valid_to,
            rate.reference,
            rate.note
        ],
    )?;
    Ok(RateId::new(conn.last_insert_rowid()))
}

/// Replace every field of record `id`; returns `false` when it does not exist.
pub fn update(conn: &Connection, id: RateId, rate: &NewInterestRate) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE interest_rates
         SET kind = ?1, percentage = ?2, valid_from = ?3, valid_to = ?4,
             reference = ?5, note = ?6, updated_at = datetime('now')
         WHERE id = ?7",
        params![
            rate.kind.as_str(),
            decimal_to_sql(rate.percentage),
            rate.valid_from,
            rate.valid_to,
            rate.reference,
            rate.note,
            id.get()
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete(conn: &Connection, id: RateId) -> rusqlite::Result<bool> {
    let changed = conn.execute("DELETE FROM interest_rates WHERE id = ?1", params![id.get()])?;
    Ok(changed > 0)
}

pub fn get(conn: &Connection, id: RateId) -> rusqlite::Result<Option<InterestRate>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM interest_rates WHERE id = ?1"),
        params![id.get()],
        from_row,
    )
    .optional()
}

/// All records, optionally of one kind, newest `valid_from` first.
pub fn list(conn: &Connection, kind: Option<RateKind>) -> rusqlite::Result<Vec<InterestRate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM interest_rates
         WHERE (?1 IS NULL OR kind = ?1)
         ORDER BY kind, valid_from DESC, id DESC"
    ))?;
    let rows = stmt.query_map(params![kind.map(|k| k.as_str())], from_row)?;
    rows.collect()
}

/// The record of `kind` whose window contains `on`, latest `valid_from` first.
pub fn covering(
    conn: &Connection,
    kind: RateKind,
    on: NaiveDate,
) -> rusqlite::Result<Option<InterestRate>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM interest_rates
             WHERE kind = ?1 AND valid_from <= ?2 AND (valid_to IS NULL OR valid_to >= ?2)
             ORDER BY valid_from DESC, id DESC
             LIMIT 1"
        ),
        params![kind.as_str(), on],
        from_row,
    )
    .optional()
}

/// The latest record of `kind` that started on or before `on`, ignoring its end.
pub fn latest_started(
    conn: &Connection,
    kind: RateKind,
    on: NaiveDate,
) -> rusqlite::Result<Option<InterestRate>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM interest_rates
             WHERE kind = ?1 AND valid_from <= ?2
             ORDER BY valid_from DESC, id DESC
             LIMIT 1"
        ),
        params![kind.as_str(), on],
        from_row,
    )
    .optional()
}

/// Records whose `valid_to` falls in `[from, to]`, soonest first.
pub fn ending_between(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> rusqlite::Result<Vec<InterestRate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM interest_rates
         WHERE valid_to IS NOT NULL AND valid_to >= ?1 AND valid_to <= ?2
         ORDER BY valid_to, id"
    ))?;
    let rows = stmt.query_map(params![from, to], from_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn legal(from: NaiveDate, to: Option<NaiveDate>) -> NewInterestRate {
        NewInterestRate {
            kind: RateKind::Legal,
            percentage: dec!(2.50),
            valid_from: from,
            valid_to: to,
            reference: "DM 2023".into(),
            note: String::new(),
        }
    }

    #[test]
    fn test_insert_get_update_delete() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let id = insert(conn, &legal(d(2024, 1, 1), Some(d(2024, 12, 31)))).unwrap();

        let stored = get(conn, id).unwrap().unwrap();
        assert_eq!(stored.percentage, dec!(2.5));
        assert_eq!(stored.valid_to, Some(d(2024, 12, 31)));

        let mut changed = legal(d(2024, 1, 1), None);
        changed.percentage = dec!(2.75);
        assert!(update(conn, id, &changed).unwrap());
        assert_eq!(get(conn, id).unwrap().unwrap().valid_to, None);

        assert!(delete(conn, id).unwrap());
        assert!(get(conn, id).unwrap().is_none());
        assert!(!delete(conn, id).unwrap());
    }

    #[test]
    fn test_list_filters_kind() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        insert(conn, &legal(d(2023, 1, 1), Some(d(2023, 12, 31)))).unwrap();
        insert(conn, &legal(d(2024, 1, 1), Some(d(2024, 12, 31)))).unwrap();
        let mut mora = legal(d(2024, 1, 1), Some(d(2024, 6, 30)));
        mora.kind = RateKind::Moratory;
        insert(conn, &mora).unwrap();

        let legal_only = list(conn, Some(RateKind::Legal)).unwrap();
        assert_eq!(legal_only.len(), 2);
        assert_eq!(legal_only[0].valid_from, d(2024, 1, 1));
        assert_eq!(list(conn, None).unwrap().len(), 3);
    }

    #[test]
    fn test_check_constraint_rejects_reversed_window() {
        let db = Database::open_in_memory().unwrap();
        let err = insert(db.connection(), &legal(d(2024, 12, 31), Some(d(2024, 1, 1)))).unwrap_err();
        assert!(crate::store::is_constraint_violation(&err));
    }
}
