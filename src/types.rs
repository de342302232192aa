//! Shared types for the RECOUP ledger.
//!
//! These types form the data model used across all modules. The engine,
//! the store and the dashboard all speak in `CouponRecord`s and the
//! derived `LedgerSummary`, so this module has no dependencies on them.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// State of a ledger row.
///
/// Bet rows are `Pending`, `Won` or `Lost`. Cash movements are stored as
/// their own rows with `Deposit` or `Withdrawal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pending,
    Won,
    Lost,
    Deposit,
    Withdrawal,
}

impl Outcome {
    /// Canonical table spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "PENDING",
            Outcome::Won => "WON",
            Outcome::Lost => "LOST",
            Outcome::Deposit => "DEPOSIT",
            Outcome::Withdrawal => "WITHDRAWAL",
        }
    }

    /// A settled bet (WON or LOST).
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Won | Outcome::Lost)
    }

    /// A bet row, settled or not.
    pub fn is_bet(&self) -> bool {
        matches!(self, Outcome::Pending | Outcome::Won | Outcome::Lost)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse an outcome (case-insensitive, with short aliases).
impl std::str::FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" | "P" | "" => Ok(Outcome::Pending),
            "WON" | "WIN" | "W" => Ok(Outcome::Won),
            "LOST" | "LOSS" | "L" => Ok(Outcome::Lost),
            "DEPOSIT" => Ok(Outcome::Deposit),
            "WITHDRAWAL" => Ok(Outcome::Withdrawal),
            _ => Err(anyhow::anyhow!("Unknown outcome: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Coupon record
// ---------------------------------------------------------------------------

/// One row of the ledger: a bet or a cash movement, with the running
/// totals as they stood after the row was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponRecord {
    pub index: u32,
    pub label: String,
    pub outcome: Outcome,
    pub stake: Decimal,
    /// Zero on transaction rows.
    pub odds: Decimal,
    /// Cash deposited together with this row.
    pub top_up: Decimal,
    /// Cash withdrawn on this row (WITHDRAWAL rows only).
    pub withdrawn: Decimal,
    pub cumulative_top_ups: Decimal,
    pub cumulative_withdrawn: Decimal,
    /// Sum of stakes over resolved bets.
    pub cumulative_staked: Decimal,
    /// `odds * stake` once WON, otherwise zero.
    pub gross_return: Decimal,
    pub balance: Decimal,
    pub net_profit: Decimal,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl fmt::Display for CouponRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Deposit => write!(
                f,
                "#{} DEPOSIT +{:.2} (capital {:.2})",
                self.index,
                self.top_up,
                self.capital(),
            ),
            Outcome::Withdrawal => write!(
                f,
                "#{} WITHDRAWAL -{:.2} (capital {:.2})",
                self.index,
                self.withdrawn,
                self.capital(),
            ),
            _ => write!(
                f,
                "#{} {} stake={:.2} @ {} return={:.2} balance={:.2}",
                self.index, self.outcome, self.stake, self.odds, self.gross_return, self.balance,
            ),
        }
    }
}

impl CouponRecord {
    /// Empty row of the given kind carrying the supplied running totals.
    pub fn blank(index: u32, label: String, outcome: Outcome, totals: &RunningTotals) -> Self {
        Self {
            index,
            label,
            outcome,
            stake: Decimal::ZERO,
            odds: Decimal::ZERO,
            top_up: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
            cumulative_top_ups: totals.cumulative_top_ups,
            cumulative_withdrawn: totals.cumulative_withdrawn,
            cumulative_staked: totals.cumulative_staked,
            gross_return: Decimal::ZERO,
            balance: totals.balance,
            net_profit: totals.balance,
            recorded_at: Some(Utc::now()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }

    /// Net contributed capital as of this row.
    pub fn capital(&self) -> Decimal {
        self.cumulative_top_ups.saturating_sub(self.cumulative_withdrawn)
    }

    /// The gross return this row contributes once settled.
    pub fn settled_return(&self) -> Result<Decimal, LedgerError> {
        if self.outcome == Outcome::Won {
            self.odds
                .checked_mul(self.stake)
                .ok_or_else(|| LedgerError::out_of_range("gross return"))
        } else {
            Ok(Decimal::ZERO)
        }
    }

    /// Contribution of this row to the balance (zero unless resolved).
    pub fn profit_loss(&self) -> Result<Decimal, LedgerError> {
        if self.outcome.is_resolved() {
            self.settled_return()?
                .checked_sub(self.stake)
                .ok_or_else(|| LedgerError::out_of_range("profit"))
        } else {
            Ok(Decimal::ZERO)
        }
    }

    /// Overwrite the derived columns with `totals`.
    pub fn apply_totals(&mut self, totals: &RunningTotals) -> Result<(), LedgerError> {
        self.gross_return = self.settled_return()?;
        self.cumulative_top_ups = totals.cumulative_top_ups;
        self.cumulative_withdrawn = totals.cumulative_withdrawn;
        self.cumulative_staked = totals.cumulative_staked;
        self.balance = totals.balance;
        self.net_profit = totals.balance;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Running totals
// ---------------------------------------------------------------------------

/// The cumulative columns of a row, detached from the row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunningTotals {
    pub cumulative_top_ups: Decimal,
    pub cumulative_withdrawn: Decimal,
    pub cumulative_staked: Decimal,
    pub balance: Decimal,
}

impl RunningTotals {
    /// Totals as stored on `record`.
    pub fn of(record: &CouponRecord) -> Self {
        Self {
            cumulative_top_ups: record.cumulative_top_ups,
            cumulative_withdrawn: record.cumulative_withdrawn,
            cumulative_staked: record.cumulative_staked,
            balance: record.balance,
        }
    }

    pub fn capital(&self) -> Decimal {
        self.cumulative_top_ups.saturating_sub(self.cumulative_withdrawn)
    }

    pub fn budget(&self) -> Decimal {
        self.capital().saturating_add(self.balance)
    }

    /// Totals after folding in the contribution of `record`.
    ///
    /// Cash movements always count; stakes and returns only once the
    /// bet is resolved. Fails when a column would leave the `Decimal`
    /// range, in which case nothing should be written.
    pub fn advance(&self, record: &CouponRecord) -> Result<Self, LedgerError> {
        let mut next = *self;
        next.cumulative_top_ups = add(next.cumulative_top_ups, record.top_up, "total top-ups")?;
        next.cumulative_withdrawn =
            add(next.cumulative_withdrawn, record.withdrawn, "total withdrawn")?;
        if record.outcome.is_resolved() {
            next = next.settle(record)?;
        }
        next.checked_goal(Decimal::ZERO)?;
        Ok(next)
    }

    /// Totals after settling the bet on `record`, whose cash movements are
    /// already included.
    pub fn settle(&self, record: &CouponRecord) -> Result<Self, LedgerError> {
        let mut next = *self;
        next.cumulative_staked = add(next.cumulative_staked, record.stake, "total staked")?;
        next.balance = add(next.balance, record.profit_loss()?, "balance")?;
        next.checked_goal(Decimal::ZERO)?;
        Ok(next)
    }

    /// The goal for `profit_target`. Also checks that capital and budget
    /// can be computed without overflow.
    pub fn checked_goal(&self, profit_target: Decimal) -> Result<Decimal, LedgerError> {
        let capital = self
            .cumulative_top_ups
            .checked_sub(self.cumulative_withdrawn)
            .ok_or_else(|| LedgerError::out_of_range("capital"))?;
        add(capital, self.balance, "budget")?;
        add(capital, profit_target, "goal")
    }
}

fn add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, LedgerError> {
    a.checked_add(b).ok_or_else(|| LedgerError::out_of_range(what))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "DEPOSIT"),
            TransactionKind::Withdrawal => write!(f, "WITHDRAWAL"),
        }
    }
}

/// An auditable cash movement, keyed by the ledger row that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sequence: u32,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {:.2}", self.sequence, self.kind, self.amount)
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Whether the bettor is currently playing with their own money or with
/// winnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    PlayingCapital,
    PlayingProfit,
    Even,
}

impl GameStatus {
    pub fn from_balance(balance: Decimal) -> Self {
        if balance < Decimal::ZERO {
            GameStatus::PlayingCapital
        } else if balance > Decimal::ZERO {
            GameStatus::PlayingProfit
        } else {
            GameStatus::Even
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::PlayingCapital => write!(f, "playing with capital"),
            GameStatus::PlayingProfit => write!(f, "playing with profit"),
            GameStatus::Even => write!(f, "even"),
        }
    }
}

/// Aggregate view of the ledger, reconciled with the last row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub capital: Decimal,
    pub balance: Decimal,
    pub budget: Decimal,
    pub net_profit: Decimal,
    pub profit_target: Decimal,
    pub goal: Decimal,
    pub total_staked: Decimal,
    pub total_returns: Decimal,
    pub coupons_won: u32,
    pub coupons_lost: u32,
    pub pending_index: Option<u32>,
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capital={:.2} | balance={:.2} | budget={:.2} | goal={:.2} (target {:.2}) | W{}/L{}",
            self.capital,
            self.balance,
            self.budget,
            self.goal,
            self.profit_target,
            self.coupons_won,
            self.coupons_lost,
        )
    }
}

impl LedgerSummary {
    pub fn goal_reached(&self) -> bool {
        self.net_profit >= self.profit_target
    }

    /// How far the budget is from the goal (negative once exceeded).
    pub fn remaining_to_goal(&self) -> Decimal {
        self.goal.saturating_sub(self.budget)
    }

    pub fn game_status(&self) -> GameStatus {
        GameStatus::from_balance(self.balance)
    }
}

// ---------------------------------------------------------------------------
// Recommendations, alerts and receipts
// ---------------------------------------------------------------------------

/// Result of a stake recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeRecommendation {
    /// Net profit already meets the target; no stake is required.
    GoalReached,
    /// Stake that brings the budget to the goal on a win.
    Stake(Decimal),
}

impl StakeRecommendation {
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            StakeRecommendation::GoalReached => None,
            StakeRecommendation::Stake(s) => Some(*s),
        }
    }
}

impl fmt::Display for StakeRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeRecommendation::GoalReached => write!(f, "goal reached, no stake required"),
            StakeRecommendation::Stake(s) => write!(f, "stake {s:.2}"),
        }
    }
}

/// Advisory raised when a stake exceeds the available budget.
///
/// This is not an error: the coupon is still placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientFundsAlert {
    pub stake: Decimal,
    pub budget: Decimal,
    pub shortfall: Decimal,
}

impl fmt::Display for InsufficientFundsAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stake {:.2} exceeds budget {:.2} (short by {:.2})",
            self.stake, self.budget, self.shortfall,
        )
    }
}

/// What `place_coupon` hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementReceipt {
    pub record: CouponRecord,
    pub alert: Option<InsufficientFundsAlert>,
}

/// Projected state if a proposed coupon wins or loses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomePreview {
    pub stake: Decimal,
    pub odds: Decimal,
    pub gross_return: Decimal,
    pub budget_if_won: Decimal,
    pub budget_if_lost: Decimal,
    pub net_profit_if_won: Decimal,
    pub net_profit_if_lost: Decimal,
    pub reaches_goal: bool,
}

/// Owned state handed between the engine and the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub records: Vec<CouponRecord>,
    pub profit_target: Decimal,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a user-entered amount, accepting a comma decimal separator.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let normalized = s.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<Decimal>().ok()
}

/// Format an amount with an explicit sign, e.g. `+123.45 PLN`.
pub fn format_currency(amount: Decimal, currency: &str) -> String {
    let amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if amount >= Decimal::ZERO {
        format!("+{amount:.2} {currency}")
    } else {
        format!("{amount:.2} {currency}")
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Validation failures raised by the ledger engine.
///
/// Every operation checks before it mutates, so receiving one of these
/// means the ledger is exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid odds {0}: odds must be greater than 1")]
    InvalidOdds(Decimal),

    #[error("Invalid amount {0}: amount must be greater than 0")]
    InvalidAmount(Decimal),

    #[error("Insufficient funds: requested {requested:.2}, budget {budget:.2}")]
    InsufficientFunds { requested: Decimal, budget: Decimal },

    #[error("Stake {stake:.2} exceeds budget {budget:.2}")]
    StakeExceedsBudget { stake: Decimal, budget: Decimal },

    #[error("Coupon #{index} is still pending")]
    PendingCouponExists { index: u32 },

    #[error("No pending coupon to resolve")]
    NoPendingCoupon,

    #[error("Ledger inconsistency at row {index}: {detail}")]
    Inconsistent { index: u32, detail: String },
}

impl LedgerError {
    /// An amount whose arithmetic would overflow the `Decimal` range.
    pub fn out_of_range(what: &str) -> Self {
        LedgerError::InvalidInput(format!("{what} is out of range"))
    }

    /// Stable machine-readable name, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::InvalidOdds(_) => "invalid_odds",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::StakeExceedsBudget { .. } => "stake_exceeds_budget",
            LedgerError::PendingCouponExists { .. } => "pending_coupon_exists",
            LedgerError::NoPendingCoupon => "no_pending_coupon",
            LedgerError::Inconsistent { .. } => "ledger_inconsistent",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
