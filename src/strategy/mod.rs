//! Staking strategy: recovery stake sizing and budget checks.

pub mod recovery;
pub mod risk;

pub use recovery::{RecoveryCalculator, RecoveryConfig, DEFAULT_PROFIT_TARGET};
pub use risk::{BudgetGuard, OverBudgetPolicy};
