//! Cost accounting and the daily budget ceiling.

pub mod ledger;

pub use ledger::{BudgetConfig, CostEntry, CostLedger, CostOutcome, Pricing};
