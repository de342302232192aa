//! Loss-recovery stake sizing.
//!
//! Computes the stake that, on a win at the given odds, lifts the budget
//! to the goal (capital + profit target), i.e. recovers every loss so far
//! and books the target profit on top.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{LedgerError, StakeRecommendation};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Recovery sizing configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Smallest currency unit, as a number of decimal places.
    pub decimal_places: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { decimal_places: 2 }
    }
}

/// Profit target used when nothing else is configured.
pub const DEFAULT_PROFIT_TARGET: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RecoveryCalculator {
    config: RecoveryConfig,
}

impl RecoveryCalculator {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Recommend the next stake.
    ///
    /// After a win the budget becomes `budget - S + odds * S`, so the
    /// smallest stake reaching the goal is:
    ///
    ///   S = (goal - budget) / (odds - 1)
    ///
    /// with `goal = capital + target` and `budget = capital + balance`.
    /// Rounded half-up to the currency unit and floored at zero.
    pub fn recommend(
        &self,
        capital: Decimal,
        balance: Decimal,
        profit_target: Decimal,
        odds: Decimal,
    ) -> Result<StakeRecommendation, LedgerError> {
        if odds <= Decimal::ONE {
            return Err(LedgerError::InvalidOdds(odds));
        }

        // net profit == balance
        if balance >= profit_target {
            debug!(%balance, %profit_target, "Goal reached, no stake required");
            return Ok(StakeRecommendation::GoalReached);
        }

        let goal = capital
            .checked_add(profit_target)
            .ok_or_else(|| LedgerError::out_of_range("goal"))?;
        let budget = capital
            .checked_add(balance)
            .ok_or_else(|| LedgerError::out_of_range("budget"))?;
        // Odds a hair above 1 can push the quotient past the Decimal range.
        let raw = goal
            .checked_sub(budget)
            .and_then(|gap| gap.checked_div(odds - Decimal::ONE))
            .ok_or_else(|| LedgerError::out_of_range("recommended stake"))?;
        let stake = self.round(raw.max(Decimal::ZERO));

        debug!(
            %goal,
            %budget,
            %odds,
            raw = %raw,
            %stake,
            "Recovery stake sized"
        );

        Ok(StakeRecommendation::Stake(stake))
    }

    /// Smallest deposit that makes `stake` affordable, rounded up to the
    /// currency unit. Zero when the budget already covers it.
    pub fn minimum_top_up(&self, stake: Decimal, budget: Decimal) -> Decimal {
        let shortfall = stake.saturating_sub(budget);
        if shortfall <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        shortfall.round_dp_with_strategy(self.config.decimal_places, RoundingStrategy::AwayFromZero)
    }

    /// Round an amount half-up to the currency unit.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(
            self.config.decimal_places,
            RoundingStrategy::MidpointAwayFromZero,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
