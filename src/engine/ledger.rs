//! Ledger engine: the owned state of one bettor's coupon sequence.
//!
//! A `Ledger` is built from a loaded [`LedgerSnapshot`] (or empty), mutated
//! through the operations below, and handed back via [`Ledger::snapshot`]
//! for saving. Each operation validates everything before it touches the
//! rows, so an `Err` always leaves the ledger unchanged.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::engine::accountant::Accountant;
use crate::strategy::{BudgetGuard, OverBudgetPolicy, RecoveryCalculator, DEFAULT_PROFIT_TARGET};
use crate::types::{
    CouponRecord, LedgerError, LedgerSnapshot, LedgerSummary, Outcome, OutcomePreview,
    PlacementReceipt, RunningTotals, StakeRecommendation, Transaction, TransactionKind,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A coupon to be placed.
#[derive(Debug, Clone, Default)]
pub struct CouponRequest {
    /// Defaults to `Coupon #<index>` when empty.
    pub label: Option<String>,
    pub stake: Decimal,
    pub odds: Decimal,
    /// Cash deposited together with the coupon.
    pub top_up: Decimal,
}

impl CouponRequest {
    pub fn new(stake: Decimal, odds: Decimal) -> Self {
        Self {
            stake,
            odds,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_top_up(mut self, top_up: Decimal) -> Self {
        self.top_up = top_up;
        self
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Ledger {
    records: Vec<CouponRecord>,
    profit_target: Decimal,
    calculator: RecoveryCalculator,
    guard: BudgetGuard,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_PROFIT_TARGET, OverBudgetPolicy::default())
    }
}

impl Ledger {
    /// An empty ledger.
    pub fn new(profit_target: Decimal, policy: OverBudgetPolicy) -> Self {
        Self {
            records: Vec::new(),
            profit_target,
            calculator: RecoveryCalculator::default(),
            guard: BudgetGuard::new(policy),
        }
    }

    /// Build a ledger from a loaded snapshot, reconciling every row.
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        policy: OverBudgetPolicy,
    ) -> Result<Self, LedgerError> {
        if snapshot.profit_target <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(snapshot.profit_target));
        }
        let totals = Accountant::reconcile(&snapshot.records)?;
        totals.checked_goal(snapshot.profit_target)?;
        info!(
            rows = snapshot.records.len(),
            capital = %totals.capital(),
            balance = %totals.balance,
            profit_target = %snapshot.profit_target,
            "Ledger restored"
        );
        Ok(Self {
            records: snapshot.records,
            profit_target: snapshot.profit_target,
            calculator: RecoveryCalculator::default(),
            guard: BudgetGuard::new(policy),
        })
    }

    /// Replace the stake calculator, e.g. to size in whole currency units.
    pub fn with_calculator(mut self, calculator: RecoveryCalculator) -> Self {
        debug!(
            decimal_places = calculator.config().decimal_places,
            "Recovery calculator configured"
        );
        self.calculator = calculator;
        self
    }

    /// Owned copy of the state for the store.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            records: self.records.clone(),
            profit_target: self.profit_target,
        }
    }

    // -- Queries -----------------------------------------------------------

    pub fn records(&self) -> &[CouponRecord] {
        &self.records
    }

    pub fn policy(&self) -> OverBudgetPolicy {
        self.guard.policy()
    }

    /// The pending coupon, if any. Always the last row.
    pub fn pending(&self) -> Option<&CouponRecord> {
        self.records.last().filter(|r| r.is_pending())
    }

    /// Running totals as of the last row.
    pub fn totals(&self) -> RunningTotals {
        self.records
            .last()
            .map(RunningTotals::of)
            .unwrap_or_default()
    }

    pub fn capital(&self) -> Decimal {
        self.totals().capital()
    }

    pub fn balance(&self) -> Decimal {
        self.totals().balance
    }

    pub fn net_profit(&self) -> Decimal {
        self.balance()
    }

    pub fn budget(&self) -> Decimal {
        self.totals().budget()
    }

    pub fn profit_target(&self) -> Decimal {
        self.profit_target
    }

    pub fn goal(&self) -> Decimal {
        self.capital().saturating_add(self.profit_target)
    }

    /// Whether net profit has reached the target.
    pub fn goal_reached(&self) -> bool {
        self.net_profit() >= self.profit_target
    }

    pub fn next_index(&self) -> u32 {
        self.records.last().map_or(1, |r| r.index.saturating_add(1))
    }

    pub fn summary(&self) -> LedgerSummary {
        let totals = self.totals();
        let mut won = 0;
        let mut lost = 0;
        let mut returns = Decimal::ZERO;
        for r in &self.records {
            match r.outcome {
                Outcome::Won => {
                    won += 1;
                    returns = returns.saturating_add(r.gross_return);
                }
                Outcome::Lost => lost += 1,
                _ => {}
            }
        }

        LedgerSummary {
            capital: totals.capital(),
            balance: totals.balance,
            budget: totals.budget(),
            net_profit: totals.balance,
            profit_target: self.profit_target,
            goal: self.goal(),
            total_staked: totals.cumulative_staked,
            total_returns: returns,
            coupons_won: won,
            coupons_lost: lost,
            pending_index: self.pending().map(|r| r.index),
        }
    }

    /// Every cash movement, in ledger order.
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut out = Vec::new();
        for r in &self.records {
            if r.top_up > Decimal::ZERO {
                out.push(Transaction {
                    sequence: r.index,
                    kind: TransactionKind::Deposit,
                    amount: r.top_up,
                    recorded_at: r.recorded_at,
                });
            }
            if r.withdrawn > Decimal::ZERO {
                out.push(Transaction {
                    sequence: r.index,
                    kind: TransactionKind::Withdrawal,
                    amount: r.withdrawn,
                    recorded_at: r.recorded_at,
                });
            }
        }
        out
    }

    /// Recommend the stake for a coupon at `odds`.
    pub fn recommend_stake(&self, odds: Decimal) -> Result<StakeRecommendation, LedgerError> {
        if odds <= Decimal::ONE {
            return Err(LedgerError::InvalidOdds(odds));
        }
        self.ensure_no_pending()?;
        self.calculator
            .recommend(self.capital(), self.balance(), self.profit_target, odds)
    }

    /// Smallest deposit that makes `stake` affordable.
    pub fn minimum_top_up(&self, stake: Decimal) -> Decimal {
        self.calculator.minimum_top_up(stake, self.budget())
    }

    /// Project the outcome of a coupon without placing it.
    pub fn preview(&self, stake: Decimal, odds: Decimal) -> Result<OutcomePreview, LedgerError> {
        validate_bet(stake, odds)?;
        let budget = self.budget();
        let balance = self.balance();
        let gross = in_range(odds.checked_mul(stake), "gross return")?;
        let win = in_range(gross.checked_sub(stake), "profit")?;
        let profit_if_won = in_range(balance.checked_add(win), "net profit")?;

        Ok(OutcomePreview {
            stake,
            odds,
            gross_return: gross,
            budget_if_won: in_range(budget.checked_add(win), "budget")?,
            budget_if_lost: in_range(budget.checked_sub(stake), "budget")?,
            net_profit_if_won: profit_if_won,
            net_profit_if_lost: in_range(balance.checked_sub(stake), "net profit")?,
            reaches_goal: profit_if_won >= self.profit_target,
        })
    }

    // -- Mutations ---------------------------------------------------------

    /// Place a new pending coupon.
    pub fn place_coupon(
        &mut self,
        stake: Decimal,
        odds: Decimal,
    ) -> Result<PlacementReceipt, LedgerError> {
        self.place(CouponRequest::new(stake, odds))
    }

    /// Place a new pending coupon with a label and/or a concurrent deposit.
    pub fn place(&mut self, request: CouponRequest) -> Result<PlacementReceipt, LedgerError> {
        self.ensure_no_pending()?;
        validate_bet(request.stake, request.odds)?;
        if request.top_up < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(request.top_up));
        }

        let totals = self.totals();
        let index = self.next_index();
        let label = label_or(request.label, || format!("Coupon #{index}"));
        let mut record = CouponRecord::blank(index, label, Outcome::Pending, &totals);
        record.stake = request.stake;
        record.odds = request.odds;
        record.top_up = request.top_up;

        // Carried totals include the top-up, so this is the budget the stake
        // is checked against.
        let carried = totals.advance(&record)?;
        let budget = carried.budget();
        let alert = self.guard.check_stake(request.stake, budget)?;
        self.ensure_settleable(&carried, &record)?;
        record.apply_totals(&carried)?;

        info!(
            index,
            stake = %record.stake,
            odds = %record.odds,
            top_up = %record.top_up,
            budget = %budget,
            over_budget = alert.is_some(),
            "Coupon placed"
        );

        self.records.push(record.clone());
        Ok(PlacementReceipt { record, alert })
    }

    /// Settle the pending coupon as WON or LOST.
    pub fn resolve_pending(&mut self, outcome: Outcome) -> Result<CouponRecord, LedgerError> {
        if !outcome.is_resolved() {
            return Err(LedgerError::InvalidInput(format!(
                "a coupon can only be resolved as WON or LOST, not {outcome}"
            )));
        }
        let pending = self.pending_mut()?;

        // Carried totals already include this row's top-up; add only the bet.
        let carried = RunningTotals::of(pending);
        let mut record = pending.clone();
        record.outcome = outcome;
        record.recorded_at = Some(Utc::now());
        let totals = carried.settle(&record)?;
        record.apply_totals(&totals)?;
        *pending = record.clone();

        info!(
            index = record.index,
            outcome = %record.outcome,
            gross_return = %record.gross_return,
            balance = %record.balance,
            budget = %totals.budget(),
            "Coupon resolved"
        );
        if record.net_profit >= self.profit_target {
            info!(
                net_profit = %record.net_profit,
                profit_target = %self.profit_target,
                "Profit target reached"
            );
        }
        Ok(record)
    }

    /// Change label, stake or odds of the pending coupon.
    pub fn amend_pending(
        &mut self,
        label: Option<String>,
        stake: Decimal,
        odds: Decimal,
    ) -> Result<PlacementReceipt, LedgerError> {
        validate_bet(stake, odds)?;
        let pending = self.pending().ok_or(LedgerError::NoPendingCoupon)?;
        let carried = RunningTotals::of(pending);
        let alert = self.guard.check_stake(stake, carried.budget())?;

        let mut record = pending.clone();
        let current = pending.label.clone();
        record.label = label_or(label, || current);
        record.stake = stake;
        record.odds = odds;
        record.recorded_at = Some(Utc::now());
        self.ensure_settleable(&carried, &record)?;
        *self.pending_mut()? = record.clone();

        info!(index = record.index, %stake, %odds, "Pending coupon amended");
        Ok(PlacementReceipt { record, alert })
    }

    /// Drop the pending coupon. Refused when it carries a deposit.
    pub fn cancel_pending(&mut self) -> Result<CouponRecord, LedgerError> {
        let pending = self.pending().ok_or(LedgerError::NoPendingCoupon)?;
        if pending.top_up > Decimal::ZERO {
            return Err(LedgerError::InvalidInput(format!(
                "coupon #{} carries a deposit of {} and cannot be cancelled",
                pending.index, pending.top_up
            )));
        }
        let record = self.records.pop().ok_or(LedgerError::NoPendingCoupon)?;
        info!(index = record.index, "Pending coupon cancelled");
        Ok(record)
    }

    /// Add capital. Folded into the pending coupon if one is open.
    pub fn deposit(&mut self, amount: Decimal) -> Result<Transaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let record = if let Some(pending) = self.pending() {
            let mut record = pending.clone();
            record.top_up = in_range(record.top_up.checked_add(amount), "top-up")?;
            record.cumulative_top_ups =
                in_range(record.cumulative_top_ups.checked_add(amount), "total top-ups")?;
            record.recorded_at = Some(Utc::now());
            let carried = RunningTotals::of(&record);
            carried.checked_goal(self.profit_target)?;
            self.ensure_settleable(&carried, &record)?;
            debug!(index = record.index, %amount, "Deposit attached to pending coupon");
            *self.pending_mut()? = record.clone();
            record
        } else {
            let totals = self.totals();
            let index = self.next_index();
            let mut record = CouponRecord::blank(
                index,
                format!("Deposit {amount:.2}"),
                Outcome::Deposit,
                &totals,
            );
            record.top_up = amount;
            let carried = totals.advance(&record)?;
            carried.checked_goal(self.profit_target)?;
            record.apply_totals(&carried)?;
            self.records.push(record.clone());
            record
        };

        info!(
            index = record.index,
            %amount,
            capital = %record.capital(),
            goal = %self.goal(),
            "Deposit recorded"
        );

        Ok(Transaction {
            sequence: record.index,
            kind: TransactionKind::Deposit,
            amount,
            recorded_at: record.recorded_at,
        })
    }

    /// Take capital out. Never more than the budget, never while a bet is open.
    pub fn withdraw(&mut self, amount: Decimal) -> Result<Transaction, LedgerError> {
        let totals = self.totals();
        self.guard.check_withdrawal(amount, totals.budget())?;
        self.ensure_no_pending()?;

        let index = self.next_index();
        let mut record = CouponRecord::blank(
            index,
            format!("Withdrawal {amount:.2}"),
            Outcome::Withdrawal,
            &totals,
        );
        record.withdrawn = amount;
        let carried = totals.advance(&record)?;
        carried.checked_goal(self.profit_target)?;
        record.apply_totals(&carried)?;

        info!(
            index,
            %amount,
            capital = %record.capital(),
            budget = %carried.budget(),
            "Withdrawal recorded"
        );

        let tx = Transaction {
            sequence: index,
            kind: TransactionKind::Withdrawal,
            amount,
            recorded_at: record.recorded_at,
        };
        self.records.push(record);
        Ok(tx)
    }

    /// Replace the profit target. Past rows are not touched.
    pub fn set_profit_target(&mut self, target: Decimal) -> Result<(), LedgerError> {
        if target <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(target));
        }
        self.totals().checked_goal(target)?;
        let previous = self.profit_target;
        self.profit_target = target;
        info!(%previous, %target, goal = %self.goal(), "Profit target changed");
        Ok(())
    }

    // -- Internals ---------------------------------------------------------

    fn ensure_no_pending(&self) -> Result<(), LedgerError> {
        match self.pending() {
            Some(p) => {
                warn!(index = p.index, "Operation refused: coupon still pending");
                Err(LedgerError::PendingCouponExists { index: p.index })
            }
            None => Ok(()),
        }
    }

    /// Both settlements of the pending `record` must stay in range, so a
    /// placed coupon can always be resolved.
    fn ensure_settleable(
        &self,
        carried: &RunningTotals,
        record: &CouponRecord,
    ) -> Result<(), LedgerError> {
        for outcome in [Outcome::Won, Outcome::Lost] {
            let mut settled = record.clone();
            settled.outcome = outcome;
            carried.settle(&settled)?.checked_goal(self.profit_target)?;
        }
        Ok(())
    }

    fn pending_mut(&mut self) -> Result<&mut CouponRecord, LedgerError> {
        self.records
            .last_mut()
            .filter(|r| r.is_pending())
            .ok_or(LedgerError::NoPendingCoupon)
    }
}

fn validate_bet(stake: Decimal, odds: Decimal) -> Result<(), LedgerError> {
    if stake <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput(format!(
            "stake must be greater than 0, got {stake}"
        )));
    }
    if odds <= Decimal::ONE {
        return Err(LedgerError::InvalidInput(format!(
            "odds must be greater than 1, got {odds}"
        )));
    }
    Ok(())
}

fn in_range(value: Option<Decimal>, what: &str) -> Result<Decimal, LedgerError> {
    value.ok_or_else(|| LedgerError::out_of_range(what))
}

fn label_or(label: Option<String>, default: impl FnOnce() -> String) -> String {
    match label {
        Some(l) if !l.trim().is_empty() => l.trim().to_string(),
        _ => default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
