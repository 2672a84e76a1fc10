use std::sync::{Arc, Mutex};
use std::time::Duration;

use abridge::{
    AbridgeError, BudgetConfig, CostLedger, CostOutcome, ErrorKind, OperationKind, Pricing,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// Ledger whose "now" is controlled by the returned handle.
fn ledger_at(
    start: DateTime<Utc>,
    budget: BudgetConfig,
) -> (CostLedger, Arc<Mutex<DateTime<Utc>>>) {
    let now = Arc::new(Mutex::new(start));
    let clock = {
        let now = Arc::clone(&now);
        Arc::new(move || *now.lock().unwrap())
    };
    (CostLedger::with_clock(Pricing::default(), budget, clock), now)
}

fn record(ledger: &CostLedger, tokens_in: u64, tokens_out: u64) {
    ledger
        .record(
            OperationKind::Summarize,
            tokens_in,
            tokens_out,
            Duration::from_millis(100),
            CostOutcome::Succeeded,
        )
        .unwrap();
}

#[test]
fn default_pricing_cost_is_exact() {
    let ledger = CostLedger::default();
    let entry = ledger
        .record(
            OperationKind::Summarize,
            1000,
            500,
            Duration::from_millis(250),
            CostOutcome::Succeeded,
        )
        .unwrap();

    assert_eq!(entry.cost_usd, Decimal::new(225, 5));
    assert_eq!(ledger.daily_spend(), Decimal::new(225, 5));
    assert_eq!(ledger.entries(), vec![entry]);
}

#[test]
fn repeated_appends_do_not_drift() {
    let ledger = CostLedger::default();
    for _ in 0..10_000 {
        record(&ledger, 1, 0);
    }
    // 10_000 * 0.00000075
    assert_eq!(ledger.daily_spend(), Decimal::new(75, 4));
}

#[test]
fn exhausted_budget_rejects_check() {
    let ledger = CostLedger::new(
        Pricing::default(),
        BudgetConfig::daily_limit(Decimal::new(1, 3)),
    );
    assert!(ledger.check_budget().is_ok());

    // 0.00075 + 0.0015: over the 0.001 limit.
    record(&ledger, 1000, 500);

    match ledger.check_budget() {
        Err(AbridgeError::BudgetExhausted { spent, limit }) => {
            assert_eq!(spent, Decimal::new(225, 5));
            assert_eq!(limit, Decimal::new(1, 3));
        }
        other => panic!("expected BudgetExhausted, got {other:?}"),
    }
    assert_eq!(ledger.remaining_budget(), Decimal::ZERO);
}

#[test]
fn remaining_budget_tracks_spend() {
    let ledger = CostLedger::new(Pricing::default(), BudgetConfig::daily_limit(Decimal::ONE));
    record(&ledger, 1000, 500);
    assert_eq!(ledger.remaining_budget(), Decimal::ONE - Decimal::new(225, 5));
}

#[test]
fn spend_at_exact_limit_is_exhausted() {
    let pricing = Pricing::new(Decimal::new(1, 2), Decimal::ZERO);
    let ledger = CostLedger::new(pricing, BudgetConfig::daily_limit(Decimal::ONE));
    ledger
        .record(
            OperationKind::Mindmap,
            100,
            0,
            Duration::ZERO,
            CostOutcome::Succeeded,
        )
        .unwrap();
    assert_eq!(ledger.daily_spend(), Decimal::ONE);
    assert!(ledger.check_budget().is_err());
}

#[test]
fn daily_spend_resets_at_utc_midnight() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
    let (ledger, now) = ledger_at(start, BudgetConfig::daily_limit(Decimal::new(1, 3)));

    record(&ledger, 1000, 500);
    assert!(ledger.check_budget().is_err());

    *now.lock().unwrap() = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap();

    assert_eq!(ledger.daily_spend(), Decimal::ZERO);
    assert!(ledger.check_budget().is_ok());
    assert_eq!(ledger.total_spend(), Decimal::new(225, 5));
    assert_eq!(ledger.entries().len(), 1);
}

#[test]
fn same_day_keeps_accumulating() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let (ledger, now) = ledger_at(start, BudgetConfig::default());

    record(&ledger, 1000, 500);
    *now.lock().unwrap() = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
    record(&ledger, 1000, 500);

    assert_eq!(ledger.daily_spend(), Decimal::new(45, 4));
}

#[test]
fn failed_outcome_is_recorded_with_its_kind() {
    let ledger = CostLedger::default();
    let entry = ledger
        .record(
            OperationKind::Mindmap,
            0,
            0,
            Duration::from_secs(20),
            CostOutcome::Failed(ErrorKind::Timeout),
        )
        .unwrap();

    assert_eq!(entry.cost_usd, Decimal::ZERO);
    assert_eq!(ledger.entries()[0].outcome, CostOutcome::Failed(ErrorKind::Timeout));
}

#[test]
fn concurrent_records_sum_exactly() {
    let ledger = Arc::new(CostLedger::default());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    record(&ledger, 1000, 500);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ledger.entries().len(), 800);
    assert_eq!(ledger.daily_spend(), Decimal::new(225, 5) * Decimal::from(800));
}

#[test]
fn partial_pricing_table_uses_defaults() {
    let pricing: Pricing = toml::from_str(r#"input_per_token = "0.000001""#).unwrap();
    assert_eq!(pricing.input_per_token, Decimal::new(1, 6));
    assert_eq!(pricing.output_per_token, Pricing::default().output_per_token);
}

#[test]
fn clock_stepping_back_does_not_reopen_previous_day() {
    let start = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap();
    let (ledger, now) = ledger_at(start, BudgetConfig::default());

    record(&ledger, 12_000, 0);
    *now.lock().unwrap() = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
    assert_eq!(ledger.daily_spend(), Decimal::new(9, 3));

    *now.lock().unwrap() = start;
    assert_eq!(ledger.daily_spend(), Decimal::new(9, 3));
}

#[test]
fn delayed_reader_at_midnight_keeps_new_day_spend() {
    let before = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
    let after = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap();
    // The "late" thread sees the old day and stalls inside the clock read.
    let clock = Arc::new(move || {
        if std::thread::current().name() == Some("late") {
            std::thread::sleep(Duration::from_millis(200));
            before
        } else {
            after
        }
    });
    let ledger = Arc::new(CostLedger::with_clock(
        Pricing::default(),
        BudgetConfig::default(),
        clock,
    ));

    let late = {
        let ledger = Arc::clone(&ledger);
        std::thread::Builder::new()
            .name("late".into())
            .spawn(move || ledger.check_budget())
            .unwrap()
    };
    std::thread::sleep(Duration::from_millis(50));
    record(&ledger, 12_000, 0);
    assert!(late.join().unwrap().is_ok());

    assert_eq!(ledger.daily_spend(), Decimal::new(9, 3));
    assert_eq!(ledger.total_spend(), Decimal::new(9, 3));
}
