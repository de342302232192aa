//! Budget guard.
//!
//! Two different checks live here and must stay distinct:
//!
//! - placing a coupon above the budget is *advisory*: it yields an
//!   [`InsufficientFundsAlert`] and still succeeds, unless the hosting
//!   policy is [`OverBudgetPolicy::Reject`];
//! - withdrawing more than the budget is always refused with
//!   [`LedgerError::InsufficientFunds`].

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::types::{InsufficientFundsAlert, LedgerError};

/// What to do when a stake exceeds the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverBudgetPolicy {
    /// Place the coupon and attach an alert.
    #[default]
    Warn,
    /// Refuse the coupon.
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct BudgetGuard {
    policy: OverBudgetPolicy,
}

impl BudgetGuard {
    pub fn new(policy: OverBudgetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OverBudgetPolicy {
        self.policy
    }

    /// Check a stake against the budget available when it is placed.
    pub fn check_stake(
        &self,
        stake: Decimal,
        budget: Decimal,
    ) -> Result<Option<InsufficientFundsAlert>, LedgerError> {
        if stake <= budget {
            return Ok(None);
        }

        match self.policy {
            OverBudgetPolicy::Warn => {
                let alert = InsufficientFundsAlert {
                    stake,
                    budget,
                    shortfall: stake.saturating_sub(budget),
                };
                warn!(%stake, %budget, shortfall = %alert.shortfall, "Stake exceeds budget");
                Ok(Some(alert))
            }
            OverBudgetPolicy::Reject => {
                warn!(%stake, %budget, "Stake exceeds budget, rejected by policy");
                Err(LedgerError::StakeExceedsBudget { stake, budget })
            }
        }
    }

    /// Check a withdrawal. Never more than the budget, never non-positive.
    pub fn check_withdrawal(&self, amount: Decimal, budget: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount > budget {
            warn!(%amount, %budget, "Withdrawal exceeds budget");
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                budget,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
