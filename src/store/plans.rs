//! Row mapping for `plans` and `installments`.

use super::{
    decimal_column, decimal_to_sql, optional_decimal_column, optional_parsed_column,
    parsed_column,
};
use crate::core::ids::{CaseId, InstallmentId, MovementId, PlanId};
use crate::core::plan::{Installment, InterestKind, InterestTerms, PaymentRecord, Plan, Surcharge};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

const PLAN_COLUMNS: &str = "id, case_id, principal, installment_count, start_date, state, \
    close_date, recovered_amount, amount_posted, recovery_movement_id, interest_kind, pre_2013, \
    surcharge_mode, surcharge_points, fixed_rate, interest_start, resolved_rate, method, \
    total_interest, accrued_interest_movement_id, notes";

const INSTALLMENT_COLUMNS: &str = "id, sequence_number, amount, principal_portion, \
    interest_portion, due_date, paid, payment_date, payment_method, payment_reference, \
    receipt_location, principal_movement_id, interest_movement_id";

/// Column encoding of [`InterestTerms`]:
/// `(interest_kind, pre_2013, surcharge_mode, surcharge_points, fixed_rate)`.
type TermColumns = (
    Option<&'static str>,
    bool,
    Option<&'static str>,
    Option<String>,
    Option<String>,
);

fn encode_terms(terms: &InterestTerms) -> TermColumns {
    let kind = terms.kind().map(|k| k.as_str());
    match terms {
        InterestTerms::None | InterestTerms::Legal => (kind, false, None, None, None),
        InterestTerms::Moratory { pre_2013, surcharge } => {
            let (mode, points) = match surcharge {
                Surcharge::None => (None, None),
                Surcharge::Standard => (Some("standard"), None),
                Surcharge::Custom(p) => (Some("custom"), Some(decimal_to_sql(*p))),
            };
            (kind, *pre_2013, mode, points, None)
        }
        InterestTerms::Fixed { rate } => (kind, false, None, None, Some(decimal_to_sql(*rate))),
    }
}

fn decode_terms(row: &Row<'_>) -> rusqlite::Result<InterestTerms> {
    let kind = match row.get::<_, Option<String>>(10)? {
        None => None,
        Some(text) => Some(text.parse::<InterestKind>().map_err(|e| bad_text(10, e))?),
    };
    let terms = match kind {
        None => InterestTerms::None,
        Some(InterestKind::Legal) => InterestTerms::Legal,
        Some(InterestKind::Moratory) => {
            let mode: Option<String> = row.get(12)?;
            let surcharge = match mode.as_deref() {
                None => Surcharge::None,
                Some("standard") => Surcharge::Standard,
                Some("custom") => Surcharge::Custom(
                    optional_decimal_column(row, 13)?.unwrap_or(Decimal::ZERO),
                ),
                Some(other) => return Err(bad_text(12, format!("unknown surcharge mode: {other}"))),
            };
            InterestTerms::Moratory {
                pre_2013: row.get(11)?,
                surcharge,
            }
        }
        Some(InterestKind::Fixed) => InterestTerms::Fixed {
            rate: optional_decimal_column(row, 14)?.unwrap_or(Decimal::ZERO),
        },
    };
    Ok(terms)
}

fn bad_text(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    let count: i64 = row.get(3)?;
    Ok(Plan {
        id: PlanId::new(row.get(0)?),
        case_id: CaseId::new(row.get(1)?),
        principal: decimal_column(row, 2)?,
        installment_count: u32::try_from(count)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e)))?,
        start_date: row.get(4)?,
        state: parsed_column(row, 5)?,
        close_date: row.get(6)?,
        recovered_amount: optional_decimal_column(row, 7)?,
        amount_posted: row.get(8)?,
        recovery_movement_id: optional_parsed_column(row, 9)?,
        interest: decode_terms(row)?,
        interest_start: row.get(15)?,
        resolved_rate: optional_decimal_column(row, 16)?,
        method: parsed_column(row, 17)?,
        total_interest: decimal_column(row, 18)?,
        accrued_interest_movement_id: optional_parsed_column(row, 19)?,
        notes: row.get(20)?,
        installments: Vec::new(),
    })
}

fn installment_from_row(row: &Row<'_>) -> rusqlite::Result<Installment> {
    let paid: bool = row.get(6)?;
    let payment = if paid {
        Some(PaymentRecord {
            date: row.get(7)?,
            method: row.get(8)?,
            reference: row.get(9)?,
            receipt_location: row.get(10)?,
            principal_movement_id: parsed_column::<MovementId>(row, 11)?,
            interest_movement_id: optional_parsed_column(row, 12)?,
        })
    } else {
        None
    };
    let sequence: i64 = row.get(1)?;
    Ok(Installment {
        id: InstallmentId::new(row.get(0)?),
        sequence_number: u32::try_from(sequence)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e)))?,
        amount: decimal_column(row, 2)?,
        principal_portion: decimal_column(row, 3)?,
        interest_portion: decimal_column(row, 4)?,
        due_date: row.get(5)?,
        payment,
    })
}

/// Insert `plan` and its installments. Row ids on the argument are ignored.
pub fn insert(conn: &Connection, plan: &Plan) -> rusqlite::Result<PlanId> {
    let (kind, pre_2013, mode, points, fixed) = encode_terms(&plan.interest);
    conn.execute(
        "INSERT INTO plans (case_id, principal, installment_count, start_date, state, close_date,
             recovered_amount, amount_posted, recovery_movement_id, interest_kind, pre_2013,
             surcharge_mode, surcharge_points, fixed_rate, interest_start, resolved_rate, method,
             total_interest, accrued_interest_movement_id, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            plan.case_id.get(),
            decimal_to_sql(plan.principal),
            plan.installment_count,
            plan.start_date,
            plan.state.as_str(),
            plan.close_date,
            plan.recovered_amount.map(decimal_to_sql),
            plan.amount_posted,
            plan.recovery_movement_id.map(|id| id.to_string()),
            kind,
            pre_2013,
            mode,
            points,
            fixed,
            plan.interest_start,
            plan.resolved_rate.map(decimal_to_sql),
            plan.method.as_str(),
            decimal_to_sql(plan.total_interest),
            plan.accrued_interest_movement_id.map(|id| id.to_string()),
            plan.notes,
        ],
    )?;
    let plan_id = PlanId::new(conn.last_insert_rowid());

    let mut stmt = conn.prepare(
        "INSERT INTO installments (plan_id, sequence_number, amount, principal_portion,
             interest_portion, due_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for installment in &plan.installments {
        stmt.execute(params![
            plan_id.get(),
            installment.sequence_number,
            decimal_to_sql(installment.amount),
            decimal_to_sql(installment.principal_portion),
            decimal_to_sql(installment.interest_portion),
            installment.due_date,
        ])?;
    }
    Ok(plan_id)
}

/// Load a plan with its installments ordered by sequence number.
pub fn load(conn: &Connection, id: PlanId) -> rusqlite::Result<Option<Plan>> {
    let plan = conn
        .query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
            params![id.get()],
            plan_from_row,
        )
        .optional()?;
    match plan {
        Some(mut plan) => {
            plan.installments = installments(conn, id)?;
            Ok(Some(plan))
        }
        None => Ok(None),
    }
}

fn installments(conn: &Connection, plan_id: PlanId) -> rusqlite::Result<Vec<Installment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INSTALLMENT_COLUMNS} FROM installments WHERE plan_id = ?1 ORDER BY sequence_number"
    ))?;
    let rows = stmt.query_map(params![plan_id.get()], installment_from_row)?;
    rows.collect()
}

/// Id of the active plan of `case_id`, if any.
pub fn active_plan_id(conn: &Connection, case_id: CaseId) -> rusqlite::Result<Option<PlanId>> {
    conn.query_row(
        "SELECT id FROM plans WHERE case_id = ?1 AND state = 'active'",
        params![case_id.get()],
        |row| row.get(0).map(PlanId::new),
    )
    .optional()
}

/// Plan ids of `case_id`, active first, then newest first.
pub fn plan_ids_for_case(conn: &Connection, case_id: CaseId) -> rusqlite::Result<Vec<PlanId>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM plans WHERE case_id = ?1
         ORDER BY (state = 'active') DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![case_id.get()], |row| row.get(0).map(PlanId::new))?;
    rows.collect()
}

/// Persist the mutable plan header fields.
pub fn update_header(conn: &Connection, plan: &Plan) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE plans
         SET state = ?1, close_date = ?2, recovered_amount = ?3, amount_posted = ?4,
             recovery_movement_id = ?5, total_interest = ?6, accrued_interest_movement_id = ?7,
             notes = ?8, updated_at = datetime('now')
         WHERE id = ?9",
        params![
            plan.state.as_str(),
            plan.close_date,
            plan.recovered_amount.map(decimal_to_sql),
            plan.amount_posted,
            plan.recovery_movement_id.map(|id| id.to_string()),
            decimal_to_sql(plan.total_interest),
            plan.accrued_interest_movement_id.map(|id| id.to_string()),
            plan.notes,
            plan.id.get(),
        ],
    )?;
    Ok(())
}

/// Persist due date and payment fields of one installment.
pub fn update_installment(conn: &Connection, installment: &Installment) -> rusqlite::Result<()> {
    let payment = installment.payment.as_ref();
    conn.execute(
        "UPDATE installments
         SET due_date = ?1, paid = ?2, payment_date = ?3, payment_method = ?4,
             payment_reference = ?5, receipt_location = ?6, principal_movement_id = ?7,
             interest_movement_id = ?8
         WHERE id = ?9",
        params![
            installment.due_date,
            payment.is_some(),
            payment.map(|p| p.date),
            payment.and_then(|p| p.method.clone()),
            payment.and_then(|p| p.reference.clone()),
            payment.and_then(|p| p.receipt_location.clone()),
            payment.map(|p| p.principal_movement_id.to_string()),
            payment.and_then(|p| p.interest_movement_id).map(|id| id.to_string()),
            installment.id.get(),
        ],
    )?;
    Ok(())
}

/// Delete a plan; its installments go with it.
pub fn delete(conn: &Connection, id: PlanId) -> rusqlite::Result<bool> {
    let changed = conn.execute("DELETE FROM plans WHERE id = ?1", params![id.get()])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{AmortizationMethod, PlanState};
    use crate::store::Database;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_plan(case: i64, terms: InterestTerms) -> Plan {
        Plan {
            id: PlanId::new(0),
            case_id: CaseId::new(case),
            principal: dec!(1000),
            installment_count: 2,
            start_date: d(2024, 1, 10),
            state: PlanState::Active,
            close_date: None,
            recovered_amount: None,
            amount_posted: false,
            recovery_movement_id: None,
            interest: terms,
            interest_start: Some(d(2023, 12, 1)),
            resolved_rate: Some(dec!(6.5)),
            method: AmortizationMethod::French,
            total_interest: dec!(12.34),
            accrued_interest_movement_id: None,
            notes: "first plan".into(),
            installments: vec![
                Installment {
                    id: InstallmentId::new(0),
                    sequence_number: 1,
                    amount: dec!(506.17),
                    principal_portion: dec!(500),
                    interest_portion: dec!(6.17),
                    due_date: d(2024, 1, 10),
                    payment: None,
                },
                Installment {
                    id: InstallmentId::new(0),
                    sequence_number: 2,
                    amount: dec!(506.17),
                    principal_portion: dec!(500),
                    interest_portion: dec!(6.17),
                    due_date: d(2024, 2, 10),
                    payment: None,
                },
            ],
        }
    }

    #[test]
    fn test_insert_and_load_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let terms = InterestTerms::Moratory {
            pre_2013: true,
            surcharge: Surcharge::Custom(dec!(2.5)),
        };
        let id = insert(db.connection(), &sample_plan(1, terms)).unwrap();
        let loaded = load(db.connection(), id).unwrap().unwrap();

        assert_eq!(loaded.id, id);
        assert_eq!(loaded.interest, terms);
        assert_eq!(loaded.method, AmortizationMethod::French);
        assert_eq!(loaded.installments.len(), 2);
        assert_eq!(loaded.installments[1].due_date, d(2024, 2, 10));
        assert!(loaded.installments.iter().all(|i| !i.is_paid()));
    }

    #[test]
    fn test_interest_kind_column() {
        let db = Database::open_in_memory().unwrap();
        let all = [
            InterestTerms::None,
            InterestTerms::Legal,
            InterestTerms::Moratory { pre_2013: false, surcharge: Surcharge::Standard },
            InterestTerms::Fixed { rate: dec!(4.25) },
        ];
        for (case, terms) in (1..).zip(all) {
            let id = insert(db.connection(), &sample_plan(case, terms)).unwrap();
            let stored: Option<String> = db
                .connection()
                .query_row("SELECT interest_kind FROM plans WHERE id = ?1", [id.get()], |r| r.get(0))
                .unwrap();
            assert_eq!(stored.as_deref(), terms.kind().map(|k| k.as_str()));
            assert_eq!(load(db.connection(), id).unwrap().unwrap().interest, terms);
        }

        db.connection()
            .execute("UPDATE plans SET interest_kind = 'variable' WHERE case_id = 2", [])
            .unwrap();
        let id = active_plan_id(db.connection(), CaseId::new(2)).unwrap().unwrap();
        assert!(load(db.connection(), id).is_err());
    }

    #[test]
    fn test_second_active_plan_violates_unique_index() {
        let db = Database::open_in_memory().unwrap();
        insert(db.connection(), &sample_plan(1, InterestTerms::None)).unwrap();
        let err = insert(db.connection(), &sample_plan(1, InterestTerms::None)).unwrap_err();
        assert!(crate::store::is_constraint_violation(&err));
        // a different case is unaffected
        insert(db.connection(), &sample_plan(2, InterestTerms::None)).unwrap();
    }

    #[test]
    fn test_payment_fields_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let id = insert(db.connection(), &sample_plan(1, InterestTerms::Legal)).unwrap();
        let mut plan = load(db.connection(), id).unwrap().unwrap();
        let mut first = plan.installments[0].clone();
        first.payment = Some(PaymentRecord {
            date: d(2024, 1, 9),
            method: Some("transfer".into()),
            reference: Some("CRO-1".into()),
            receipt_location: None,
            principal_movement_id: MovementId::new_v4(),
            interest_movement_id: Some(MovementId::new_v4()),
        });
        update_installment(db.connection(), &first).unwrap();

        plan = load(db.connection(), id).unwrap().unwrap();
        assert_eq!(plan.installments[0].payment, first.payment);
    }

    #[test]
    fn test_delete_cascades_installments() {
        let db = Database::open_in_memory().unwrap();
        let id = insert(db.connection(), &sample_plan(1, InterestTerms::None)).unwrap();
        assert!(delete(db.connection(), id).unwrap());
        let remaining: i64 = db
            .connection()
            .query_row("SELECT count(*) FROM installments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
