//! Running cost ledger with a daily spend ceiling.
//!
//! [`CostLedger`] is the only writer of the day's spend. The generation
//! client reads it before every attempt ([`CostLedger::check_budget()`])
//! and appends exactly one [`CostEntry`] per logical request that reached
//! the remote service. Amounts are [`Decimal`] so repeated appends never
//! accumulate floating-point drift.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::telemetry;
use crate::types::OperationKind;
use crate::{AbridgeError, Result};

/// Per-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    /// USD per input (prompt) token. Default: 0.00000075.
    pub input_per_token: Decimal,
    /// USD per output (completion) token. Default: 0.000003.
    pub output_per_token: Decimal,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_token: Decimal::new(75, 8),
            output_per_token: Decimal::new(3, 6),
        }
    }
}

impl Pricing {
    pub fn new(input_per_token: Decimal, output_per_token: Decimal) -> Self {
        Self {
            input_per_token,
            output_per_token,
        }
    }

    /// `tokens_in * input_per_token + tokens_out * output_per_token`.
    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> Decimal {
        Decimal::from(tokens_in) * self.input_per_token
            + Decimal::from(tokens_out) * self.output_per_token
    }
}

/// Daily budget settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Spend ceiling per UTC day. Default: $10.
    pub daily_limit_usd: Decimal,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: Decimal::new(10, 0),
        }
    }
}

impl BudgetConfig {
    pub fn daily_limit(limit_usd: Decimal) -> Self {
        Self {
            daily_limit_usd: limit_usd,
        }
    }

    /// Effectively no ceiling.
    pub fn unlimited() -> Self {
        Self {
            daily_limit_usd: Decimal::MAX,
        }
    }
}

/// Terminal outcome a cost entry was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "kind")]
pub enum CostOutcome {
    Succeeded,
    Failed(ErrorKind),
}

impl fmt::Display for CostOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostOutcome::Succeeded => f.write_str("succeeded"),
            CostOutcome::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Usage and cost of one completed logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub operation: OperationKind,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: Decimal,
    pub latency: Duration,
    pub outcome: CostOutcome,
}

impl CostEntry {
    /// Build an entry priced with `pricing`.
    pub fn priced(
        pricing: &Pricing,
        operation: OperationKind,
        tokens_in: u64,
        tokens_out: u64,
        latency: Duration,
        outcome: CostOutcome,
    ) -> Self {
        Self {
            operation,
            tokens_in,
            tokens_out,
            cost_usd: pricing.cost(tokens_in, tokens_out),
            latency,
            outcome,
        }
    }
}

/// Source of "now", injectable for day-rollover tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct LedgerState {
    day: NaiveDate,
    spent_today: Decimal,
    spent_total: Decimal,
    entries: Vec<CostEntry>,
}

/// Thread-safe accumulator of request costs.
pub struct CostLedger {
    pricing: Pricing,
    budget: BudgetConfig,
    clock: Clock,
    state: Mutex<LedgerState>,
}

impl CostLedger {
    pub fn new(pricing: Pricing, budget: BudgetConfig) -> Self {
        Self::with_clock(pricing, budget, Arc::new(Utc::now))
    }

    /// Ledger reading the current time from `clock`.
    pub fn with_clock(pricing: Pricing, budget: BudgetConfig, clock: Clock) -> Self {
        let today = clock().date_naive();
        Self {
            pricing,
            budget,
            clock,
            state: Mutex::new(LedgerState {
                day: today,
                spent_today: Decimal::ZERO,
                spent_total: Decimal::ZERO,
                entries: Vec::new(),
            }),
        }
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn daily_limit(&self) -> Decimal {
        self.budget.daily_limit_usd
    }

    /// Lock the state, resetting the daily total at the UTC date boundary.
    ///
    /// The clock is read under the lock and the window only moves forward, so
    /// a caller holding a stale reading cannot reopen the previous day.
    fn current(&self) -> MutexGuard<'_, LedgerState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let today = (self.clock)().date_naive();
        if today > state.day {
            info!(
                previous_day = %state.day,
                spent = %state.spent_today,
                "daily budget window rolled over"
            );
            state.day = today;
            state.spent_today = Decimal::ZERO;
        }
        state
    }

    /// Append a completed request's cost. Returns the new daily spend.
    ///
    /// The only mutator of the day's spend.
    pub fn append(&self, entry: CostEntry) -> Result<Decimal> {
        if entry.cost_usd.is_sign_negative() {
            return Err(AbridgeError::InvalidInput(format!(
                "negative cost {} for {}",
                entry.cost_usd, entry.operation
            )));
        }

        metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "input")
            .increment(entry.tokens_in);
        metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "output")
            .increment(entry.tokens_out);
        let micro_usd = (entry.cost_usd * Decimal::from(1_000_000u32))
            .round()
            .to_u64()
            .unwrap_or(u64::MAX);
        metrics::counter!(telemetry::COST_MICRO_USD_TOTAL).increment(micro_usd);

        let mut state = self.current();
        let was_under = state.spent_today < self.budget.daily_limit_usd;
        state.spent_today += entry.cost_usd;
        state.spent_total += entry.cost_usd;
        let spent = state.spent_today;

        info!(
            operation = %entry.operation,
            tokens_in = entry.tokens_in,
            tokens_out = entry.tokens_out,
            cost_usd = %entry.cost_usd,
            outcome = %entry.outcome,
            spent_today = %spent,
            "recorded request cost"
        );
        if was_under && spent >= self.budget.daily_limit_usd {
            warn!(
                spent_today = %spent,
                limit = %self.budget.daily_limit_usd,
                "daily budget exhausted"
            );
        }

        state.entries.push(entry);
        Ok(spent)
    }

    /// Price and append in one step.
    pub fn record(
        &self,
        operation: OperationKind,
        tokens_in: u64,
        tokens_out: u64,
        latency: Duration,
        outcome: CostOutcome,
    ) -> Result<CostEntry> {
        let entry = CostEntry::priced(
            &self.pricing,
            operation,
            tokens_in,
            tokens_out,
            latency,
            outcome,
        );
        self.append(entry.clone())?;
        Ok(entry)
    }

    /// Spend since the last UTC midnight.
    pub fn daily_spend(&self) -> Decimal {
        self.current().spent_today
    }

    /// Spend since the ledger was created.
    pub fn total_spend(&self) -> Decimal {
        self.current().spent_total
    }

    /// What is left of today's budget (never negative).
    pub fn remaining_budget(&self) -> Decimal {
        (self.budget.daily_limit_usd - self.daily_spend()).max(Decimal::ZERO)
    }

    /// Pre-flight check: fails once today's spend has reached the limit.
    pub fn check_budget(&self) -> Result<()> {
        let spent = self.daily_spend();
        if spent >= self.budget.daily_limit_usd {
            return Err(AbridgeError::BudgetExhausted {
                spent,
                limit: self.budget.daily_limit_usd,
            });
        }
        Ok(())
    }

    /// Snapshot of every entry appended so far, oldest first.
    pub fn entries(&self) -> Vec<CostEntry> {
        self.current().entries.clone()
    }
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new(Pricing::default(), BudgetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_cost_is_exact() {
        let pricing = Pricing::default();
        assert_eq!(pricing.cost(1000, 500), Decimal::new(225, 5)); // 0.00075 + 0.0015
        assert_eq!(pricing.cost(0, 0), Decimal::ZERO);
    }

    #[test]
    fn negative_cost_rejected() {
        let ledger = CostLedger::default();
        let entry = CostEntry {
            operation: OperationKind::Summarize,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: Decimal::new(-1, 2),
            latency: Duration::ZERO,
            outcome: CostOutcome::Succeeded,
        };
        assert!(ledger.append(entry).is_err());
        assert_eq!(ledger.daily_spend(), Decimal::ZERO);
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn outcome_serializes_with_kind() {
        let json = serde_json::to_string(&CostOutcome::Failed(ErrorKind::Timeout)).unwrap();
        assert_eq!(json, r#"{"status":"failed","kind":"timeout"}"#);
    }
}
