//! repayment-engine CLI
//!
//! Manage interest rates and repayment plans from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Register the legal rate for 2025
//! repayment-engine rates add --kind legal --percentage 2.00 --from 2025-01-01 --to 2025-12-31
//!
//! # Preview a schedule without storing it
//! repayment-engine schedule --principal 12000 --installments 12 --start 2025-02-01 --rate 6 --method french
//!
//! # Create a plan at the legal rate and pay its first installment
//! repayment-engine plan create --case 42 --principal 5000 --installments 10 --start 2025-03-01 --interest legal
//! repayment-engine plan pay 1 1 --method transfer
//!
//! # Fetch candidate rates for review, then approve one
//! repayment-engine sourcing run --output candidates.json
//! repayment-engine sourcing approve --input candidates.json --index 0
//! ```

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use repayment_engine::amortization::schedule::{AmortizationEngine, InterestParameters, ScheduleRequest};
use repayment_engine::config::{default_settings_path, load_settings, Settings};
use repayment_engine::core::calendar::today;
use repayment_engine::core::ids::{CaseId, InstallmentId, PlanId, RateId};
use repayment_engine::core::plan::{AmortizationMethod, CloseOutcome, InterestTerms, Plan, Surcharge};
use repayment_engine::core::rate::{InterestRate, NewInterestRate, RateKind};
use repayment_engine::lifecycle::plan_service::{
    CloseRequest, CreatePlanRequest, InstallmentUpdate, PaymentDetails, PlanLifecycle,
};
use repayment_engine::monitor::notify::LogNotifier;
use repayment_engine::monitor::rate_monitor::RateMonitor;
use repayment_engine::registry::rate_registry::RateRegistry;
use repayment_engine::sourcing::approval;
use repayment_engine::sourcing::fetch::ReqwestClient;
use repayment_engine::sourcing::pipeline::{SourcingPipeline, SourcingReport};
use repayment_engine::store::journal::{SqliteHistory, SqliteLedger};
use repayment_engine::store::Database;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "repayment-engine",
    version,
    about = "Debt-repayment plans and statutory interest rates."
)]
struct Cli {
    /// Settings file (default: <config dir>/repayment-engine/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the interest-rate registry.
    Rates {
        #[command(subcommand)]
        command: RatesCommands,
    },
    /// Compute a schedule without storing anything.
    Schedule {
        #[arg(long)]
        principal: Decimal,
        #[arg(long)]
        installments: u32,
        /// First due date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Annual rate in percent; omit for no interest
        #[arg(long)]
        rate: Option<Decimal>,
        /// Accrual start (default: --start)
        #[arg(long = "interest-start")]
        interest_start: Option<NaiveDate>,
        #[arg(long, default_value = "italian")]
        method: AmortizationMethod,
    },
    /// Manage repayment plans.
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Fetch and approve candidate rates.
    Sourcing {
        #[command(subcommand)]
        command: SourcingCommands,
    },
    /// Run a monitoring duty once.
    Monitor {
        #[command(subcommand)]
        command: MonitorCommands,
    },
}

#[derive(Subcommand)]
enum RatesCommands {
    /// List rate records, newest first.
    List {
        #[arg(long)]
        kind: Option<RateKind>,
    },
    /// Add a rate record.
    Add {
        #[arg(long)]
        kind: RateKind,
        #[arg(long)]
        percentage: Decimal,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        reference: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Change fields of a rate record.
    Update {
        id: i64,
        #[arg(long)]
        percentage: Option<Decimal>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Make the record open-ended
        #[arg(long = "open-ended", conflicts_with = "to")]
        open_ended: bool,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Remove a rate record.
    Remove { id: i64 },
    /// Show the rates in force on a day.
    Resolve {
        /// Default: today
        #[arg(long)]
        on: Option<NaiveDate>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InterestArg {
    None,
    Legal,
    Moratory,
    Fixed,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Positive,
    Negative,
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a plan for a case.
    Create {
        #[arg(long = "case")]
        case_id: i64,
        #[arg(long)]
        principal: Decimal,
        #[arg(long)]
        installments: u32,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long, value_enum, default_value = "none")]
        interest: InterestArg,
        /// Annual rate for --interest fixed
        #[arg(long)]
        rate: Option<Decimal>,
        /// Moratory only: debt arose before 2013
        #[arg(long = "pre-2013")]
        pre_2013: bool,
        /// Moratory only: "standard" or a number of points
        #[arg(long)]
        surcharge: Option<String>,
        #[arg(long = "interest-start")]
        interest_start: Option<NaiveDate>,
        #[arg(long, default_value = "italian")]
        method: AmortizationMethod,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Show the active (or latest) plan of a case.
    Show {
        #[arg(long = "case")]
        case_id: i64,
    },
    /// Progress statistics of a plan.
    Stats {
        plan: i64,
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    /// Pay an installment (by sequence number).
    Pay {
        plan: i64,
        installment: u32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        receipt: Option<String>,
    },
    /// Reverse the payment of an installment.
    Reverse { plan: i64, installment: u32 },
    /// Move a due date or correct payment details.
    UpdateInstallment {
        plan: i64,
        installment: u32,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        receipt: Option<String>,
    },
    /// Close a plan.
    Close {
        plan: i64,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long)]
        note: Option<String>,
        /// Leave the recovered amount unposted
        #[arg(long = "defer-post")]
        defer_post: bool,
    },
    /// Reopen a closed plan.
    Reopen { plan: i64 },
    /// Post the recovered amount of a closed plan.
    Inject { plan: i64 },
    /// Delete a plan.
    Delete { plan: i64 },
}

#[derive(Subcommand)]
enum SourcingCommands {
    /// Fetch candidates from every source and classify them.
    Run {
        /// Save the report for a later `approve`
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Store a candidate from a saved report.
    Approve {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        index: usize,
        /// Replace this record instead of creating a new one
        #[arg(long)]
        overwrite: Option<i64>,
    },
}

#[derive(Subcommand)]
enum MonitorCommands {
    /// Notify about records expiring within the horizon.
    Expiry {
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    /// Notify about rate kinds with nothing in force.
    Missing {
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    /// Run the scheduled sourcing trigger.
    Sourcing,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path)?;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Rates { command } => cmd_rates(command, &settings, out),
        Commands::Schedule {
            principal,
            installments,
            start,
            rate,
            interest_start,
            method,
        } => {
            let schedule = AmortizationEngine::generate(&ScheduleRequest {
                principal,
                installment_count: installments,
                start_date: start,
                interest: rate.map(|annual_rate_percent| InterestParameters {
                    annual_rate_percent,
                    interest_start: interest_start.unwrap_or(start),
                    method,
                }),
            })?;
            out.show(&schedule, |s| println!("{s}"))
        }
        Commands::Plan { command } => cmd_plan(command, &settings, out),
        Commands::Sourcing { command } => cmd_sourcing(command, &settings, out),
        Commands::Monitor { command } => cmd_monitor(command, &settings, out),
    }
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn show<T: Serialize>(self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

fn open_database(settings: &Settings) -> Result<Database> {
    let path = Path::new(&settings.database_path);
    ensure_parent(path)?;
    Database::open(path).with_context(|| format!("cannot open database {}", path.display()))
}

fn open_lifecycle(settings: &Settings) -> Result<PlanLifecycle<SqliteLedger, SqliteHistory>> {
    let journal = Path::new(&settings.journal_path);
    ensure_parent(journal)?;
    let ledger = SqliteLedger::open(journal)
        .with_context(|| format!("cannot open journal {}", journal.display()))?;
    let history = SqliteHistory::open(journal)?;
    let lifecycle = PlanLifecycle::new(ledger, history, settings.interest.clone());
    Ok(match std::env::var("USER") {
        Ok(user) => lifecycle.with_actor(user),
        Err(_) => lifecycle,
    })
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------
// rates
// ---------------------------------------------------------------

fn cmd_rates(command: RatesCommands, settings: &Settings, out: Output) -> Result<()> {
    let db = open_database(settings)?;
    let registry = RateRegistry::new(db.connection());

    match command {
        RatesCommands::List { kind } => {
            let rates = registry.list(kind)?;
            out.show(&rates, |rates| {
                if rates.is_empty() {
                    println!("No rates recorded.");
                }
                for rate in rates {
                    print_rate(rate);
                }
            })
        }
        RatesCommands::Add {
            kind,
            percentage,
            from,
            to,
            reference,
            note,
        } => {
            let rate = registry.create(&NewInterestRate {
                kind,
                percentage,
                valid_from: from,
                valid_to: to,
                reference,
                note,
            })?;
            out.show(&rate, |r| {
                print!("Added ");
                print_rate(r);
            })
        }
        RatesCommands::Update {
            id,
            percentage,
            from,
            to,
            open_ended,
            reference,
            note,
        } => {
            let id = RateId::new(id);
            let current = registry.get(id)?;
            let valid_to = match (open_ended, to) {
                (true, _) => None,
                (false, Some(to)) => Some(to),
                (false, None) => current.valid_to,
            };
            let rate = registry.update(
                id,
                &NewInterestRate {
                    kind: current.kind,
                    percentage: percentage.unwrap_or(current.percentage),
                    valid_from: from.unwrap_or(current.valid_from),
                    valid_to,
                    reference: reference.unwrap_or(current.reference),
                    note: note.unwrap_or(current.note),
                },
            )?;
            out.show(&rate, |r| {
                print!("Updated ");
                print_rate(r);
            })
        }
        RatesCommands::Remove { id } => {
            registry.delete(RateId::new(id))?;
            println!("Removed rate {id}");
            Ok(())
        }
        RatesCommands::Resolve { on } => {
            let current = registry.current_rates(on.unwrap_or_else(today))?;
            out.show(&current, |c| {
                println!("Rates in force on {}", c.on);
                for (label, rate) in [("legal", &c.legal), ("moratory", &c.moratory)] {
                    match rate {
                        Some(rate) => print_rate(rate),
                        None => println!("  {label:<8} none"),
                    }
                }
            })
        }
    }
}

fn print_rate(rate: &InterestRate) {
    println!(
        "  #{:<4} {:<8} {:>6}%  {} → {}  {}",
        rate.id,
        rate.kind.as_str(),
        rate.percentage.to_string(),
        rate.valid_from,
        rate.valid_to
            .map(|d| d.to_string())
            .unwrap_or_else(|| "open".to_string()),
        rate.reference
    );
}

// ---------------------------------------------------------------
// plan
// ---------------------------------------------------------------

fn interest_terms(
    interest: InterestArg,
    rate: Option<Decimal>,
    pre_2013: bool,
    surcharge: Option<&str>,
) -> Result<InterestTerms> {
    Ok(match interest {
        InterestArg::None => InterestTerms::None,
        InterestArg::Legal => InterestTerms::Legal,
        InterestArg::Moratory => InterestTerms::Moratory {
            pre_2013,
            surcharge: match surcharge {
                None => Surcharge::None,
                Some("standard") => Surcharge::Standard,
                Some(points) => Surcharge::Custom(
                    points
                        .parse()
                        .with_context(|| format!("invalid surcharge '{points}'"))?,
                ),
            },
        },
        InterestArg::Fixed => match rate {
            Some(rate) => InterestTerms::Fixed { rate },
            None => bail!("--interest fixed requires --rate"),
        },
    })
}

fn installment_id(plan: &Plan, sequence: u32) -> Result<InstallmentId> {
    plan.installment_by_sequence(sequence)
        .map(|i| i.id)
        .with_context(|| format!("plan {} has no installment #{sequence}", plan.id))
}

fn cmd_plan(command: PlanCommands, settings: &Settings, out: Output) -> Result<()> {
    let mut db = open_database(settings)?;
    let mut lifecycle = open_lifecycle(settings)?;

    match command {
        PlanCommands::Create {
            case_id,
            principal,
            installments,
            start,
            interest,
            rate,
            pre_2013,
            surcharge,
            interest_start,
            method,
            notes,
        } => {
            let mut request = CreatePlanRequest::new(CaseId::new(case_id), principal, installments, start)
                .with_interest(interest_terms(interest, rate, pre_2013, surcharge.as_deref())?, method);
            request.interest_start = interest_start;
            request.notes = notes;
            let plan = lifecycle.create_plan(&mut db, request)?;
            out.show(&plan, print_plan)
        }
        PlanCommands::Show { case_id } => {
            let plan = lifecycle.get_plan_by_case(&db, CaseId::new(case_id))?;
            out.show(&plan, print_plan)
        }
        PlanCommands::Stats { plan, on } => {
            let stats = lifecycle.plan_statistics(&db, PlanId::new(plan), on.unwrap_or_else(today))?;
            out.show(&stats, |s| println!("{s}"))
        }
        PlanCommands::Pay {
            plan,
            installment,
            date,
            method,
            reference,
            receipt,
        } => {
            let plan = lifecycle.get_plan(&db, PlanId::new(plan))?;
            let id = installment_id(&plan, installment)?;
            let paid = lifecycle.pay_installment(
                &mut db,
                plan.id,
                id,
                PaymentDetails {
                    date,
                    method,
                    reference,
                    receipt_location: receipt,
                },
            )?;
            out.show(&paid, |i| {
                println!("Paid installment #{} of plan {} ({})", i.sequence_number, plan.id, i.amount)
            })
        }
        PlanCommands::Reverse { plan, installment } => {
            let plan = lifecycle.get_plan(&db, PlanId::new(plan))?;
            let id = installment_id(&plan, installment)?;
            let reversed = lifecycle.reverse_installment(&mut db, plan.id, id)?;
            out.show(&reversed, |i| {
                println!("Reversed installment #{} of plan {}", i.sequence_number, plan.id)
            })
        }
        PlanCommands::UpdateInstallment {
            plan,
            installment,
            due,
            method,
            reference,
            receipt,
        } => {
            let plan = lifecycle.get_plan(&db, PlanId::new(plan))?;
            let id = installment_id(&plan, installment)?;
            let updated = lifecycle.update_installment(
                &mut db,
                plan.id,
                id,
                InstallmentUpdate {
                    due_date: due,
                    payment_method: method,
                    payment_reference: reference,
                    receipt_location: receipt,
                },
            )?;
            out.show(&updated, |i| {
                println!("Updated installment #{} of plan {}", i.sequence_number, plan.id)
            })
        }
        PlanCommands::Close {
            plan,
            outcome,
            note,
            defer_post,
        } => {
            let outcome = match outcome {
                OutcomeArg::Positive => CloseOutcome::Positive,
                OutcomeArg::Negative => CloseOutcome::Negative,
            };
            let mut request = CloseRequest::new(outcome);
            request.note = note;
            request.post_recovered_amount = !defer_post;
            let plan = lifecycle.close_plan(&mut db, PlanId::new(plan), request)?;
            out.show(&plan, print_plan)
        }
        PlanCommands::Reopen { plan } => {
            let plan = lifecycle.reopen_plan(&mut db, PlanId::new(plan))?;
            out.show(&plan, print_plan)
        }
        PlanCommands::Inject { plan } => {
            let plan = lifecycle.inject_recovered_amount(&mut db, PlanId::new(plan))?;
            out.show(&plan, print_plan)
        }
        PlanCommands::Delete { plan } => {
            lifecycle.delete_plan(&mut db, PlanId::new(plan))?;
            println!("Deleted plan {plan}");
            Ok(())
        }
    }
}

fn print_plan(plan: &Plan) {
    println!("=== Plan {} (case {}) ===", plan.id, plan.case_id);
    println!("State:          {}", plan.state);
    println!("Principal:      {}", plan.principal);
    match (plan.interest_kind(), plan.resolved_rate) {
        (Some(kind), Some(rate)) => {
            println!("Interest:       {} at {}% ({})", kind.as_str(), rate, plan.method)
        }
        _ => println!("Interest:       none"),
    }
    println!("Total interest: {}", plan.total_interest);
    if let Some(date) = plan.close_date {
        println!("Closed on:      {date}");
    }
    if let Some(amount) = plan.recovered_amount {
        let posted = if plan.amount_posted { "posted" } else { "not posted" };
        println!("Recovered:      {amount} ({posted})");
    }
    if !plan.notes.is_empty() {
        println!("Notes:          {}", plan.notes);
    }
    println!(
        "\n{:>4}  {:<10}  {:>12}  {:>12}  {:>10}  {}",
        "#", "due", "amount", "principal", "interest", "paid"
    );
    for i in &plan.installments {
        println!(
            "{:>4}  {:<10}  {:>12}  {:>12}  {:>10}  {}",
            i.sequence_number,
            i.due_date.to_string(),
            i.amount.to_string(),
            i.principal_portion.to_string(),
            i.interest_portion.to_string(),
            i.payment
                .as_ref()
                .map(|p| p.date.to_string())
                .unwrap_or_default()
        );
    }
}

// ---------------------------------------------------------------
// sourcing / monitor
// ---------------------------------------------------------------

fn cmd_sourcing(command: SourcingCommands, settings: &Settings, out: Output) -> Result<()> {
    let db = open_database(settings)?;

    match command {
        SourcingCommands::Run { output } => {
            let client = ReqwestClient::new(settings.sourcing.timeout())?;
            let report = SourcingPipeline::from_settings(&settings.sourcing).run(&client, db.connection())?;
            if let Some(path) = output {
                report
                    .save(&path)
                    .with_context(|| format!("cannot write {}", path.display()))?;
                eprintln!("Report saved to {}", path.display());
            }
            out.show(&report, |r| println!("{r}"))
        }
        SourcingCommands::Approve {
            input,
            index,
            overwrite,
        } => {
            let report = SourcingReport::load(&input)
                .with_context(|| format!("cannot read report {}", input.display()))?;
            let Some(candidate) = report.candidates.get(index) else {
                bail!(
                    "report has {} candidates, no index {index}",
                    report.candidates.len()
                );
            };
            let registry = RateRegistry::new(db.connection());
            let rate = match overwrite {
                Some(id) => approval::overwrite(&registry, RateId::new(id), candidate)?,
                None => approval::approve(&registry, candidate)?,
            };
            out.show(&rate, |r| {
                print!("Stored ");
                print_rate(r);
            })
        }
    }
}

fn cmd_monitor(command: MonitorCommands, settings: &Settings, out: Output) -> Result<()> {
    let db = open_database(settings)?;
    let mut monitor = RateMonitor::new(LogNotifier, settings.monitor.clone());

    match command {
        MonitorCommands::Expiry { on } => {
            let report = monitor.run_expiry_check(db.connection(), on.unwrap_or_else(today))?;
            out.show(&report, |r| {
                println!("{} expiring records, {} notifications", r.scanned, r.notifications_sent)
            })
        }
        MonitorCommands::Missing { on } => {
            let report = monitor.run_missing_rate_check(db.connection(), on.unwrap_or_else(today))?;
            out.show(&report, |r| {
                println!("{} kinds checked, {} missing", r.scanned, r.notifications_sent)
            })
        }
        MonitorCommands::Sourcing => {
            let client = ReqwestClient::new(settings.sourcing.timeout())?;
            let pipeline = SourcingPipeline::from_settings(&settings.sourcing);
            match monitor.run_sourcing(&pipeline, &client, db.connection(), settings.sourcing.scheduled_enabled)? {
                Some(report) => out.show(&report, |r| println!("{r}")),
                None => {
                    println!("Scheduled sourcing is disabled.");
                    Ok(())
                }
            }
        }
    }
}
