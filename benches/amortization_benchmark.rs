use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use repayment_engine::amortization::schedule::{AmortizationEngine, InterestParameters, ScheduleRequest};
use repayment_engine::core::plan::AmortizationMethod;
use repayment_engine::core::rate::{NewInterestRate, RateKind};
use repayment_engine::registry::rate_registry::RateRegistry;
use repayment_engine::store::Database;
use rust_decimal_macros::dec;

fn request(count: u32, method: AmortizationMethod) -> ScheduleRequest {
    let start_date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    ScheduleRequest {
        principal: dec!(250_000.00),
        installment_count: count,
        start_date,
        interest: Some(InterestParameters {
            annual_rate_percent: dec!(10.15),
            interest_start: NaiveDate::from_ymd_opt(2023, 11, 1).unwrap(),
            method,
        }),
    }
}

fn bench_italian_360(c: &mut Criterion) {
    let request = request(360, AmortizationMethod::Italian);
    c.bench_function("italian_360_installments", |b| {
        b.iter(|| AmortizationEngine::generate(black_box(&request)))
    });
}

fn bench_french_360(c: &mut Criterion) {
    let request = request(360, AmortizationMethod::French);
    c.bench_function("french_360_installments", |b| {
        b.iter(|| AmortizationEngine::generate(black_box(&request)))
    });
}

fn bench_rate_resolution(c: &mut Criterion) {
    let db = Database::open_in_memory().unwrap();
    let registry = RateRegistry::new(db.connection());
    // Twenty years of half-year moratory records.
    for year in 2005..2025 {
        for (from, to) in [((1, 1), (6, 30)), ((7, 1), (12, 31))] {
            registry
                .create(&NewInterestRate {
                    kind: RateKind::Moratory,
                    percentage: dec!(9.50),
                    valid_from: NaiveDate::from_ymd_opt(year, from.0, from.1).unwrap(),
                    valid_to: NaiveDate::from_ymd_opt(year, to.0, to.1),
                    reference: String::new(),
                    note: String::new(),
                })
                .unwrap();
        }
    }
    let on = NaiveDate::from_ymd_opt(2016, 8, 15).unwrap();

    c.bench_function("resolve_moratory_40_records", |b| {
        b.iter(|| registry.resolve(RateKind::Moratory, black_box(on)))
    });
}

criterion_group!(
    benches,
    bench_italian_360,
    bench_french_360,
    bench_rate_resolution
);
criterion_main!(benches);
