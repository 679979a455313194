//! Plan lifecycle: creation, payments, reversals, closing and reopening.
//!
//! Every transition runs inside one store transaction. When a transition
//! fails before commit, the ledger movements it posted are deleted again
//! and the ones it deleted are restored. Case-history events are only
//! appended once the transaction has committed, so a caller never observes
//! half of a transition.

use crate::amortization::schedule::{AmortizationEngine, InterestParameters, ScheduleRequest};
use crate::config::InterestSettings;
use crate::core::calendar::today;
use crate::core::ids::{CaseId, InstallmentId, MovementId, PlanId};
use crate::core::money::{is_valid_percentage, round2};
use crate::core::plan::{
    AmortizationMethod, CloseOutcome, Installment, InterestTerms, PaymentRecord, Plan, PlanState,
    Surcharge,
};
use crate::core::rate::RateKind;
use crate::error::{EngineError, Result};
use crate::lifecycle::collaborators::{CaseHistory, EventType, Ledger, Movement, MovementKind};
use crate::lifecycle::statistics::PlanStatistics;
use crate::registry::rate_registry::RateRegistry;
use crate::store::{is_constraint_violation, plans, Database};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Input of [`PlanLifecycle::create_plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub case_id: CaseId,
    pub principal: Decimal,
    pub installment_count: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub interest: InterestTerms,
    /// Defaults to `start_date`.
    #[serde(default)]
    pub interest_start: Option<NaiveDate>,
    #[serde(default)]
    pub method: AmortizationMethod,
    #[serde(default)]
    pub notes: String,
}

impl CreatePlanRequest {
    pub fn new(case_id: CaseId, principal: Decimal, installment_count: u32, start_date: NaiveDate) -> Self {
        Self {
            case_id,
            principal,
            installment_count,
            start_date,
            interest: InterestTerms::None,
            interest_start: None,
            method: AmortizationMethod::default(),
            notes: String::new(),
        }
    }

    pub fn with_interest(mut self, interest: InterestTerms, method: AmortizationMethod) -> Self {
        self.interest = interest;
        self.method = method;
        self
    }

    pub fn with_interest_start(mut self, date: NaiveDate) -> Self {
        self.interest_start = Some(date);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.principal <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "principal must be positive, got {}",
                self.principal
            )));
        }
        if self.principal.normalize().scale() > 2 {
            return Err(EngineError::Validation(format!(
                "principal {} has more than two decimals",
                self.principal
            )));
        }
        if self.installment_count == 0 {
            return Err(EngineError::Validation(
                "installment count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Payment data supplied when paying an installment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Defaults to today.
    pub date: Option<NaiveDate>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub receipt_location: Option<String>,
}

/// Changes to an installment that carry no ledger effect.
///
/// The due date can only move on unpaid installments; the payment fields
/// can only change on paid ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentUpdate {
    pub due_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub receipt_location: Option<String>,
}

impl InstallmentUpdate {
    fn touches_payment(&self) -> bool {
        self.payment_method.is_some()
            || self.payment_reference.is_some()
            || self.receipt_location.is_some()
    }

    fn is_empty(&self) -> bool {
        self.due_date.is_none() && !self.touches_payment()
    }
}

/// Input of [`PlanLifecycle::close_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub outcome: CloseOutcome,
    #[serde(default)]
    pub note: Option<String>,
    /// When `false` the recovered amount is left for a later
    /// [`PlanLifecycle::inject_recovered_amount`].
    #[serde(default = "default_post")]
    pub post_recovered_amount: bool,
}

fn default_post() -> bool {
    true
}

impl CloseRequest {
    pub fn new(outcome: CloseOutcome) -> Self {
        Self {
            outcome,
            note: None,
            post_recovered_amount: true,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn deferring_post(mut self) -> Self {
        self.post_recovered_amount = false;
        self
    }
}

/// Side effects collected while a transition runs.
#[derive(Default)]
struct UnitOfWork {
    posted: Vec<MovementId>,
    deleted: Vec<Movement>,
    events: Vec<(CaseId, EventType, serde_json::Value)>,
}

impl UnitOfWork {
    fn event(&mut self, case_id: CaseId, event_type: EventType, payload: serde_json::Value) {
        self.events.push((case_id, event_type, payload));
    }
}

/// Owns plan transitions against a store, a ledger and a case history.
pub struct PlanLifecycle<L: Ledger, H: CaseHistory> {
    ledger: L,
    history: H,
    interest: InterestSettings,
    actor: Option<String>,
}

impl<L: Ledger, H: CaseHistory> PlanLifecycle<L, H> {
    pub fn new(ledger: L, history: H, interest: InterestSettings) -> Self {
        Self {
            ledger,
            history,
            interest,
            actor: None,
        }
    }

    /// Attribute subsequent history events to `actor`.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn interest_settings(&self) -> &InterestSettings {
        &self.interest
    }

    pub fn into_parts(self) -> (L, H) {
        (self.ledger, self.history)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn get_plan(&self, db: &Database, plan_id: PlanId) -> Result<Plan> {
        load_plan(db.connection(), plan_id)
    }

    /// The active plan of a case, or its most recent one.
    pub fn get_plan_by_case(&self, db: &Database, case_id: CaseId) -> Result<Plan> {
        let ids = plans::plan_ids_for_case(db.connection(), case_id)?;
        match ids.first() {
            Some(id) => load_plan(db.connection(), *id),
            None => Err(EngineError::not_found("plan for case", case_id)),
        }
    }

    pub fn plans_for_case(&self, db: &Database, case_id: CaseId) -> Result<Vec<Plan>> {
        plans::plan_ids_for_case(db.connection(), case_id)?
            .into_iter()
            .map(|id| load_plan(db.connection(), id))
            .collect()
    }

    pub fn plan_statistics(&self, db: &Database, plan_id: PlanId, on: NaiveDate) -> Result<PlanStatistics> {
        let plan = load_plan(db.connection(), plan_id)?;
        Ok(PlanStatistics::compute(&plan, on))
    }

    /// Annual percentage `terms` would apply to a plan whose interest
    /// starts on `on`, after moratory adjustments. `None` for interest-free
    /// terms.
    pub fn effective_rate(&self, conn: &Connection, terms: &InterestTerms, on: NaiveDate) -> Result<Option<Decimal>> {
        let registry = RateRegistry::new(conn);
        match *terms {
            InterestTerms::None => Ok(None),
            InterestTerms::Legal => Ok(Some(registry.require(RateKind::Legal, on)?.percentage)),
            InterestTerms::Moratory { pre_2013, surcharge } => {
                let mut rate = registry.require(RateKind::Moratory, on)?.percentage;
                if pre_2013 {
                    rate = (rate - self.interest.pre_2013_reduction_points).max(Decimal::ZERO);
                }
                match surcharge {
                    Surcharge::None => {}
                    Surcharge::Standard => rate += self.interest.moratory_surcharge_points,
                    Surcharge::Custom(points) if points < Decimal::ZERO => {
                        return Err(EngineError::Validation(format!(
                            "surcharge must not be negative, got {points}"
                        )));
                    }
                    Surcharge::Custom(points) => rate += points,
                }
                Ok(Some(round2(rate)))
            }
            InterestTerms::Fixed { rate } => {
                if !is_valid_percentage(rate) {
                    return Err(EngineError::Validation(format!(
                        "fixed rate must be between 0 and 100, got {rate}"
                    )));
                }
                if rate.normalize().scale() > 2 {
                    return Err(EngineError::Validation(format!(
                        "fixed rate {rate} has more than two decimals"
                    )));
                }
                Ok(Some(rate))
            }
        }
    }

    // ---------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------

    /// (none) → active.
    pub fn create_plan(&mut self, db: &mut Database, request: CreatePlanRequest) -> Result<Plan> {
        request.validate()?;
        let plan_id = self.transact(db, |this, conn, work| {
            if let Some(existing) = plans::active_plan_id(conn, request.case_id)? {
                return Err(EngineError::Conflict(format!(
                    "case {} already has active plan {existing}",
                    request.case_id
                )));
            }

            let interest_start = request.interest_start.unwrap_or(request.start_date);
            let resolved_rate = this.effective_rate(conn, &request.interest, interest_start)?;
            let schedule = AmortizationEngine::generate(&ScheduleRequest {
                principal: request.principal,
                installment_count: request.installment_count,
                start_date: request.start_date,
                interest: resolved_rate.map(|rate| InterestParameters {
                    annual_rate_percent: rate,
                    interest_start,
                    method: request.method,
                }),
            })
            .map_err(|e| EngineError::Validation(e.to_string()))?;

            let mut plan = Plan {
                id: PlanId::new(0),
                case_id: request.case_id,
                principal: request.principal,
                installment_count: request.installment_count,
                start_date: request.start_date,
                state: PlanState::Active,
                close_date: None,
                recovered_amount: None,
                amount_posted: false,
                recovery_movement_id: None,
                interest: request.interest,
                interest_start: request.interest.applies_interest().then_some(interest_start),
                resolved_rate,
                method: request.method,
                total_interest: schedule.total_interest(),
                accrued_interest_movement_id: None,
                notes: request.notes.clone(),
                installments: schedule
                    .installments()
                    .iter()
                    .map(|row| Installment {
                        id: InstallmentId::new(0),
                        sequence_number: row.sequence_number,
                        amount: row.amount,
                        principal_portion: row.principal_portion,
                        interest_portion: row.interest_portion,
                        due_date: row.due_date,
                        payment: None,
                    })
                    .collect(),
            };
            plan.id = plans::insert(conn, &plan).map_err(active_plan_conflict)?;

            if plan.total_interest > Decimal::ZERO {
                let memo = format!("interest accrued on plan {}", plan.id);
                let movement = this.post(
                    work,
                    plan.case_id,
                    MovementKind::InterestAccrued,
                    plan.total_interest,
                    today(),
                    &memo,
                )?;
                plan.accrued_interest_movement_id = Some(movement);
                plans::update_header(conn, &plan)?;
            }

            work.event(
                plan.case_id,
                EventType::PlanCreated,
                json!({
                    "plan_id": plan.id,
                    "principal": plan.principal,
                    "installment_count": plan.installment_count,
                    "start_date": plan.start_date,
                    "interest": plan.interest,
                    "resolved_rate": plan.resolved_rate,
                    "method": plan.method,
                    "total_interest": plan.total_interest,
                }),
            );
            Ok(plan.id)
        })?;
        log::info!("created plan {plan_id} for case {}", request.case_id);
        load_plan(db.connection(), plan_id)
    }

    /// active → active: mark one installment paid and post its movements.
    pub fn pay_installment(
        &mut self,
        db: &mut Database,
        plan_id: PlanId,
        installment_id: InstallmentId,
        details: PaymentDetails,
    ) -> Result<Installment> {
        let installment = self.transact(db, |this, conn, work| {
            let plan = load_plan(conn, plan_id)?;
            require_active(&plan, "pay an installment")?;
            let mut installment = find_installment(&plan, installment_id)?;
            if installment.is_paid() {
                return Err(EngineError::Conflict(format!(
                    "installment {} of plan {plan_id} is already paid",
                    installment.sequence_number
                )));
            }

            let date = details.date.unwrap_or_else(today);
            let seq = installment.sequence_number;
            let principal_movement_id = this.post(
                work,
                plan.case_id,
                MovementKind::PrincipalRecovery,
                installment.principal_portion,
                date,
                &format!("plan {plan_id} installment {seq} principal"),
            )?;
            let interest_movement_id = if installment.interest_portion > Decimal::ZERO {
                Some(this.post(
                    work,
                    plan.case_id,
                    MovementKind::InterestRecovery,
                    installment.interest_portion,
                    date,
                    &format!("plan {plan_id} installment {seq} interest"),
                )?)
            } else {
                None
            };

            installment.payment = Some(PaymentRecord {
                date,
                method: details.method.clone(),
                reference: details.reference.clone(),
                receipt_location: details.receipt_location.clone(),
                principal_movement_id,
                interest_movement_id,
            });
            plans::update_installment(conn, &installment)?;

            work.event(
                plan.case_id,
                EventType::PlanPayment,
                json!({
                    "plan_id": plan_id,
                    "installment_id": installment.id,
                    "sequence_number": seq,
                    "amount": installment.amount,
                    "payment_date": date,
                    "payment_method": details.method,
                    "payment_reference": details.reference,
                }),
            );
            Ok(installment)
        })?;
        log::info!(
            "paid installment {} of plan {plan_id}",
            installment.sequence_number
        );
        Ok(installment)
    }

    /// active → active: undo a payment and delete its movements.
    pub fn reverse_installment(
        &mut self,
        db: &mut Database,
        plan_id: PlanId,
        installment_id: InstallmentId,
    ) -> Result<Installment> {
        let installment = self.transact(db, |this, conn, work| {
            let plan = load_plan(conn, plan_id)?;
            require_active(&plan, "reverse a payment")?;
            let mut installment = find_installment(&plan, installment_id)?;
            let Some(payment) = installment.payment.take() else {
                return Err(EngineError::PreconditionFailed(format!(
                    "installment {} of plan {plan_id} is not paid",
                    installment.sequence_number
                )));
            };

            this.remove(work, plan.case_id, payment.principal_movement_id)?;
            if let Some(interest) = payment.interest_movement_id {
                this.remove(work, plan.case_id, interest)?;
            }
            plans::update_installment(conn, &installment)?;

            work.event(
                plan.case_id,
                EventType::PlanReversal,
                json!({
                    "plan_id": plan_id,
                    "installment_id": installment.id,
                    "sequence_number": installment.sequence_number,
                    "amount": installment.amount,
                    "reversed_payment_date": payment.date,
                }),
            );
            Ok(installment)
        })?;
        log::info!(
            "reversed installment {} of plan {plan_id}",
            installment.sequence_number
        );
        Ok(installment)
    }

    pub fn update_installment(
        &mut self,
        db: &mut Database,
        plan_id: PlanId,
        installment_id: InstallmentId,
        update: InstallmentUpdate,
    ) -> Result<Installment> {
        if update.is_empty() {
            return Err(EngineError::Validation("nothing to update".to_string()));
        }
        self.transact(db, |_, conn, work| {
            let plan = load_plan(conn, plan_id)?;
            require_active(&plan, "update an installment")?;
            let mut installment = find_installment(&plan, installment_id)?;

            if let Some(due_date) = update.due_date {
                if installment.is_paid() {
                    return Err(EngineError::PreconditionFailed(
                        "the due date of a paid installment cannot change".to_string(),
                    ));
                }
                installment.due_date = due_date;
            }
            if update.touches_payment() {
                let Some(payment) = installment.payment.as_mut() else {
                    return Err(EngineError::PreconditionFailed(
                        "payment details can only change on a paid installment".to_string(),
                    ));
                };
                if let Some(method) = &update.payment_method {
                    payment.method = Some(method.clone());
                }
                if let Some(reference) = &update.payment_reference {
                    payment.reference = Some(reference.clone());
                }
                if let Some(location) = &update.receipt_location {
                    payment.receipt_location = Some(location.clone());
                }
            }
            plans::update_installment(conn, &installment)?;

            work.event(
                plan.case_id,
                EventType::PlanInstallmentUpdated,
                json!({
                    "plan_id": plan_id,
                    "installment_id": installment.id,
                    "changes": update,
                }),
            );
            log::info!(
                "updated installment {} of plan {plan_id}",
                installment.sequence_number
            );
            Ok(installment)
        })
    }

    /// active → closed_positive | closed_negative.
    pub fn close_plan(&mut self, db: &mut Database, plan_id: PlanId, request: CloseRequest) -> Result<Plan> {
        self.transact(db, |this, conn, work| {
            let mut plan = load_plan(conn, plan_id)?;
            require_active(&plan, "close the plan")?;

            let close_date = today();
            let recovered = plan.paid_total();
            if recovered > Decimal::ZERO && request.post_recovered_amount {
                let movement = this.post(
                    work,
                    plan.case_id,
                    MovementKind::PrincipalRecovery,
                    recovered,
                    close_date,
                    &format!("recovered amount of plan {plan_id}"),
                )?;
                plan.recovery_movement_id = Some(movement);
                plan.amount_posted = true;
            } else {
                plan.amount_posted = false;
            }
            plan.state = request.outcome.state();
            plan.close_date = Some(close_date);
            plan.recovered_amount = Some(recovered);
            if let Some(note) = request.note.as_deref().filter(|n| !n.trim().is_empty()) {
                append_note(&mut plan.notes, note);
            }
            plans::update_header(conn, &plan)?;

            work.event(
                plan.case_id,
                EventType::PlanClosed,
                json!({
                    "plan_id": plan_id,
                    "outcome": request.outcome,
                    "close_date": close_date,
                    "recovered_amount": recovered,
                    "amount_posted": plan.amount_posted,
                    "note": request.note,
                }),
            );
            log::info!("closed plan {plan_id} as {}", plan.state);
            Ok(plan)
        })
    }

    /// closed_* → active.
    pub fn reopen_plan(&mut self, db: &mut Database, plan_id: PlanId) -> Result<Plan> {
        self.transact(db, |this, conn, work| {
            let mut plan = load_plan(conn, plan_id)?;
            if !plan.state.is_closed() {
                return Err(EngineError::PreconditionFailed(format!(
                    "plan {plan_id} is {}, only closed plans can be reopened",
                    plan.state
                )));
            }
            if let Some(existing) = plans::active_plan_id(conn, plan.case_id)? {
                return Err(EngineError::Conflict(format!(
                    "case {} already has active plan {existing}",
                    plan.case_id
                )));
            }

            let removed = plan.recovery_movement_id.take();
            if let Some(movement) = removed {
                this.remove(work, plan.case_id, movement)?;
            }
            let previous = plan.state;
            plan.state = PlanState::Active;
            plan.amount_posted = false;
            plan.recovered_amount = None;
            plan.close_date = None;
            plans::update_header(conn, &plan).map_err(active_plan_conflict)?;

            work.event(
                plan.case_id,
                EventType::PlanReopened,
                json!({
                    "plan_id": plan_id,
                    "previous_state": previous,
                    "recovery_movement_deleted": removed,
                }),
            );
            log::info!("reopened plan {plan_id}");
            Ok(plan)
        })
    }

    /// closed_* → closed_*: post a recovered amount left unposted at close.
    pub fn inject_recovered_amount(&mut self, db: &mut Database, plan_id: PlanId) -> Result<Plan> {
        self.transact(db, |this, conn, work| {
            let mut plan = load_plan(conn, plan_id)?;
            if plan.is_active() {
                return Err(EngineError::PreconditionFailed(format!(
                    "plan {plan_id} is still active"
                )));
            }
            if plan.amount_posted {
                return Err(EngineError::Conflict(format!(
                    "recovered amount of plan {plan_id} is already posted"
                )));
            }
            let recovered = match plan.recovered_amount {
                Some(amount) if amount > Decimal::ZERO => amount,
                _ => {
                    return Err(EngineError::PreconditionFailed(format!(
                        "plan {plan_id} has no recovered amount to post"
                    )))
                }
            };

            let date = today();
            let movement = this.post(
                work,
                plan.case_id,
                MovementKind::PrincipalRecovery,
                recovered,
                date,
                &format!("recovered amount of plan {plan_id}"),
            )?;
            plan.recovery_movement_id = Some(movement);
            plan.amount_posted = true;
            plans::update_header(conn, &plan)?;

            work.event(
                plan.case_id,
                EventType::PlanRecoveredAmountPosted,
                json!({
                    "plan_id": plan_id,
                    "amount": recovered,
                    "date": date,
                }),
            );
            log::info!("posted recovered amount {recovered} of plan {plan_id}");
            Ok(plan)
        })
    }

    /// Remove a plan whose recovered amount was never posted, together
    /// with the movements it still links to.
    pub fn delete_plan(&mut self, db: &mut Database, plan_id: PlanId) -> Result<()> {
        self.transact(db, |this, conn, work| {
            let plan = load_plan(conn, plan_id)?;
            if plan.amount_posted {
                return Err(EngineError::PreconditionFailed(format!(
                    "plan {plan_id} has a posted recovered amount and cannot be deleted"
                )));
            }

            for payment in plan.installments.iter().filter_map(|i| i.payment.as_ref()) {
                this.remove(work, plan.case_id, payment.principal_movement_id)?;
                if let Some(interest) = payment.interest_movement_id {
                    this.remove(work, plan.case_id, interest)?;
                }
            }
            if let Some(accrued) = plan.accrued_interest_movement_id {
                this.remove(work, plan.case_id, accrued)?;
            }
            plans::delete(conn, plan_id)?;

            work.event(
                plan.case_id,
                EventType::PlanDeleted,
                json!({
                    "plan_id": plan_id,
                    "state": plan.state,
                    "principal": plan.principal,
                }),
            );
            log::info!("deleted plan {plan_id}");
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Transaction plumbing
    // ---------------------------------------------------------------

    fn transact<T>(
        &mut self,
        db: &mut Database,
        op: impl FnOnce(&mut Self, &Connection, &mut UnitOfWork) -> Result<T>,
    ) -> Result<T> {
        let tx = db.transaction()?;
        let mut work = UnitOfWork::default();
        let conn: &Connection = &tx;
        let result = op(self, conn, &mut work)
            .and_then(|value| tx.commit().map(|()| value).map_err(EngineError::from));

        match result {
            Ok(value) => {
                self.flush_events(work.events);
                Ok(value)
            }
            Err(err) => {
                self.compensate(&work);
                Err(err)
            }
        }
    }

    fn post(
        &mut self,
        work: &mut UnitOfWork,
        case_id: CaseId,
        kind: MovementKind,
        amount: Decimal,
        date: NaiveDate,
        memo: &str,
    ) -> Result<MovementId> {
        let id = self
            .ledger
            .post_movement(case_id, kind, amount, date, memo)
            .map_err(EngineError::Ledger)?;
        work.posted.push(id);
        work.event(
            case_id,
            EventType::MovementInserted,
            json!({
                "movement_id": id,
                "kind": kind,
                "amount": amount,
                "date": date,
                "memo": memo,
            }),
        );
        Ok(id)
    }

    fn remove(&mut self, work: &mut UnitOfWork, case_id: CaseId, id: MovementId) -> Result<()> {
        let Some(movement) = self.ledger.find_movement(id).map_err(EngineError::Ledger)? else {
            log::warn!("movement {id} of case {case_id} is already gone from the ledger");
            return Ok(());
        };
        work.event(
            case_id,
            EventType::MovementDeleted,
            json!({
                "movement_id": id,
                "kind": movement.kind,
                "amount": movement.amount,
                "date": movement.date,
            }),
        );
        self.ledger.delete_movement(id).map_err(EngineError::Ledger)?;
        work.deleted.push(movement);
        Ok(())
    }

    /// Undo the ledger side of a failed transition: drop what was posted,
    /// put back what was deleted.
    fn compensate(&mut self, work: &UnitOfWork) {
        for id in work.posted.iter().rev() {
            match self.ledger.delete_movement(*id) {
                Ok(()) => log::warn!("rolled back movement {id}"),
                Err(e) => log::error!("could not roll back movement {id}: {e}"),
            }
        }
        for movement in work.deleted.iter().rev() {
            match self.ledger.restore_movement(movement) {
                Ok(()) => log::warn!("restored movement {}", movement.id),
                Err(e) => log::error!("could not restore movement {}: {e}", movement.id),
            }
        }
    }

    fn flush_events(&mut self, events: Vec<(CaseId, EventType, serde_json::Value)>) {
        for (case_id, event_type, payload) in events {
            if let Err(e) = self
                .history
                .append_event(case_id, event_type, &payload, self.actor.as_deref())
            {
                log::error!("could not record {event_type} for case {case_id}: {e}");
            }
        }
    }
}

fn load_plan(conn: &Connection, plan_id: PlanId) -> Result<Plan> {
    plans::load(conn, plan_id)?.ok_or_else(|| EngineError::not_found("plan", plan_id))
}

fn find_installment(plan: &Plan, installment_id: InstallmentId) -> Result<Installment> {
    plan.installment(installment_id)
        .cloned()
        .ok_or_else(|| EngineError::not_found("installment", installment_id))
}

fn require_active(plan: &Plan, action: &str) -> Result<()> {
    if plan.is_active() {
        Ok(())
    } else {
        Err(EngineError::PreconditionFailed(format!(
            "cannot {action}: plan {} is {}",
            plan.id, plan.state
        )))
    }
}

fn active_plan_conflict(err: rusqlite::Error) -> EngineError {
    if is_constraint_violation(&err) {
        EngineError::Conflict("case already has an active plan".to_string())
    } else {
        EngineError::Storage(err)
    }
}

fn append_note(notes: &mut String, note: &str) {
    if !notes.is_empty() {
        notes.push('\n');
    }
    notes.push_str(note.trim());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::NewInterestRate;
    use crate::lifecycle::collaborators::{MemoryHistory, MemoryLedger};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn lifecycle() -> PlanLifecycle<MemoryLedger, MemoryHistory> {
        PlanLifecycle::new(MemoryLedger::new(), MemoryHistory::new(), InterestSettings::default())
    }

    fn seed_rate(db: &Database, kind: RateKind, percentage: Decimal, from: NaiveDate) {
        RateRegistry::new(db.connection())
            .create(&NewInterestRate {
                kind,
                percentage,
                valid_from: from,
                valid_to: None,
                reference: String::new(),
                note: String::new(),
            })
            .unwrap();
    }

    #[test]
    fn test_create_plan_without_interest() {
        let mut db = Database::open_in_memory().unwrap();
        let mut lc = lifecycle();
        let plan = lc
            .create_plan(&mut db, CreatePlanRequest::new(CaseId::new(1), dec!(10000), 3, d(2024, 1, 15)))
            .unwrap();

        assert_eq!(plan.state, PlanState::Active);
        assert_eq!(plan.installments.len(), 3);
        assert_eq!(plan.installments[2].principal_portion, dec!(3333.34));
        assert!(plan.accrued_interest_movement_id.is_none());
        assert!(lc.ledger().is_empty());
        assert_eq!(lc.history().of_type(EventType::PlanCreated).count(), 1);
    }

    #[test]
    fn test_moratory_adjustments() {
        let db = Database::open_in_memory().unwrap();
        seed_rate(&db, RateKind::Moratory, dec!(12.15), d(2024, 1, 1));
        let lc = lifecycle();
        let on = d(2024, 3, 1);

        let plain = InterestTerms::Moratory { pre_2013: false, surcharge: Surcharge::None };
        let reduced = InterestTerms::Moratory { pre_2013: true, surcharge: Surcharge::None };
        let standard = InterestTerms::Moratory { pre_2013: true, surcharge: Surcharge::Standard };
        let custom = InterestTerms::Moratory { pre_2013: false, surcharge: Surcharge::Custom(dec!(2)) };

        assert_eq!(lc.effective_rate(db.connection(), &plain, on).unwrap(), Some(dec!(12.15)));
        assert_eq!(lc.effective_rate(db.connection(), &reduced, on).unwrap(), Some(dec!(11.15)));
        assert_eq!(lc.effective_rate(db.connection(), &standard, on).unwrap(), Some(dec!(15.15)));
        assert_eq!(lc.effective_rate(db.connection(), &custom, on).unwrap(), Some(dec!(14.15)));
    }

    #[test]
    fn test_custom_surcharge_is_rounded_to_cents() {
        let db = Database::open_in_memory().unwrap();
        seed_rate(&db, RateKind::Moratory, dec!(12.15), d(2024, 1, 1));
        let terms = InterestTerms::Moratory { pre_2013: false, surcharge: Surcharge::Custom(dec!(0.125)) };
        let rate = lifecycle().effective_rate(db.connection(), &terms, d(2024, 3, 1)).unwrap();
        assert_eq!(rate, Some(dec!(12.28)));
    }

    #[test]
    fn test_pre_2013_reduction_floors_at_zero() {
        let db = Database::open_in_memory().unwrap();
        seed_rate(&db, RateKind::Moratory, dec!(0.5), d(2024, 1, 1));
        let terms = InterestTerms::Moratory { pre_2013: true, surcharge: Surcharge::None };
        let rate = lifecycle().effective_rate(db.connection(), &terms, d(2024, 2, 1)).unwrap();
        assert_eq!(rate, Some(Decimal::ZERO));
    }

    #[test]
    fn test_missing_legal_rate_is_reported() {
        let mut db = Database::open_in_memory().unwrap();
        let mut lc = lifecycle();
        let request = CreatePlanRequest::new(CaseId::new(1), dec!(1000), 2, d(2024, 1, 1))
            .with_interest(InterestTerms::Legal, AmortizationMethod::Italian);

        let err = lc.create_plan(&mut db, request).unwrap_err();
        assert!(matches!(err, EngineError::MissingRate { kind: RateKind::Legal, .. }));
        assert!(plans::active_plan_id(db.connection(), CaseId::new(1)).unwrap().is_none());
    }

    #[test]
    fn test_fixed_rate_out_of_range() {
        let db = Database::open_in_memory().unwrap();
        let terms = InterestTerms::Fixed { rate: dec!(120) };
        let err = lifecycle().effective_rate(db.connection(), &terms, d(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let terms = InterestTerms::Fixed { rate: dec!(4.125) };
        let err = lifecycle().effective_rate(db.connection(), &terms, d(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_principal_with_three_decimals_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let err = lifecycle()
            .create_plan(&mut db, CreatePlanRequest::new(CaseId::new(1), dec!(100.005), 2, d(2024, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_failed_post_is_compensated() {
        let mut db = Database::open_in_memory().unwrap();
        let mut lc = PlanLifecycle::new(
            MemoryLedger::new().fail_after(2),
            MemoryHistory::new(),
            InterestSettings::default(),
        );
        let plan = lc
            .create_plan(
                &mut db,
                CreatePlanRequest::new(CaseId::new(3), dec!(1000), 2, d(2024, 1, 1))
                    .with_interest(InterestTerms::Fixed { rate: dec!(5) }, AmortizationMethod::Italian),
            )
            .unwrap();
        assert_eq!(lc.ledger().len(), 1);

        // Principal posts, interest fails: the principal movement must go.
        let second = &plan.installments[1];
        assert!(second.interest_portion > Decimal::ZERO);
        let err = lc
            .pay_installment(&mut db, plan.id, second.id, PaymentDetails::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Ledger(_)));
        assert_eq!(lc.ledger().len(), 1);
        let reloaded = lc.get_plan(&db, plan.id).unwrap();
        assert!(!reloaded.installments[1].is_paid());
        assert_eq!(lc.history().of_type(EventType::PlanPayment).count(), 0);
        assert_eq!(lc.history().of_type(EventType::MovementInserted).count(), 1);
    }

    #[test]
    fn test_failed_reversal_restores_deleted_movements() {
        let mut db = Database::open_in_memory().unwrap();
        let mut lc = PlanLifecycle::new(
            MemoryLedger::new().fail_deletes_after(1),
            MemoryHistory::new(),
            InterestSettings::default(),
        );
        let plan = lc
            .create_plan(
                &mut db,
                CreatePlanRequest::new(CaseId::new(4), dec!(1000), 2, d(2024, 1, 1))
                    .with_interest(InterestTerms::Fixed { rate: dec!(5) }, AmortizationMethod::Italian),
            )
            .unwrap();
        let second = plan.installments[1].id;
        let paid = lc
            .pay_installment(&mut db, plan.id, second, PaymentDetails::default())
            .unwrap();
        let payment = paid.payment.clone().unwrap();
        let interest = payment.interest_movement_id.unwrap();
        assert_eq!(lc.ledger().len(), 3);

        // Principal deletion succeeds, interest deletion fails.
        let err = lc.reverse_installment(&mut db, plan.id, second).unwrap_err();
        assert!(matches!(err, EngineError::Ledger(_)));
        assert_eq!(lc.ledger().len(), 3);
        assert!(lc.ledger().contains(payment.principal_movement_id));
        assert!(lc.ledger().contains(interest));

        let reloaded = lc.get_plan(&db, plan.id).unwrap();
        assert_eq!(reloaded.installments[1].payment, Some(payment));
        assert_eq!(lc.history().of_type(EventType::PlanReversal).count(), 0);
        assert_eq!(lc.history().of_type(EventType::MovementDeleted).count(), 0);
    }

    #[test]
    fn test_notes_are_appended() {
        let mut notes = String::from("first");
        append_note(&mut notes, " second ");
        assert_eq!(notes, "first\nsecond");
    }
}
