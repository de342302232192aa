//! Accountant: replays and reconciles the ledger.
//!
//! The ledger keeps running totals on every row. The accountant rebuilds
//! those totals from the raw inputs (stake, odds, outcome, cash movements)
//! and checks that the stored values agree, so drift or hand-edited rows
//! are caught when a snapshot is loaded.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::types::{CouponRecord, LedgerError, Outcome, RunningTotals};

pub struct Accountant;

impl Accountant {
    /// Fold every row from scratch into running totals.
    pub fn replay(records: &[CouponRecord]) -> Result<RunningTotals, LedgerError> {
        records
            .iter()
            .try_fold(RunningTotals::default(), |totals, r| totals.advance(r))
    }

    /// Rewrite every derived column from the raw inputs.
    pub fn rebuild(records: &mut [CouponRecord]) -> Result<(), LedgerError> {
        let mut totals = RunningTotals::default();
        for record in records.iter_mut() {
            totals = totals.advance(record)?;
            record.apply_totals(&totals)?;
        }
        debug!(rows = records.len(), balance = %totals.balance, "Ledger rebuilt");
        Ok(())
    }

    /// Validate a loaded sequence and return its final totals.
    pub fn reconcile(records: &[CouponRecord]) -> Result<RunningTotals, LedgerError> {
        let mut totals = RunningTotals::default();
        let mut last_index = 0u32;
        let last_pos = records.len().saturating_sub(1);

        for (pos, record) in records.iter().enumerate() {
            let fail = |detail: String| {
                warn!(index = record.index, %detail, "Ledger reconciliation failed");
                LedgerError::Inconsistent {
                    index: record.index,
                    detail,
                }
            };

            if record.index <= last_index {
                return Err(fail(format!(
                    "index must be greater than {last_index}"
                )));
            }
            last_index = record.index;

            if record.is_pending() && pos != last_pos {
                return Err(fail("pending coupon is not the last row".into()));
            }

            Self::check_shape(record).map_err(&fail)?;

            if record.outcome == Outcome::Withdrawal && record.withdrawn > totals.budget() {
                return Err(fail(format!(
                    "withdrawal {} exceeds budget {}",
                    record.withdrawn,
                    totals.budget()
                )));
            }

            totals = totals.advance(record).map_err(|e| fail(e.to_string()))?;

            let expected = {
                let mut r = record.clone();
                r.apply_totals(&totals).map_err(|e| fail(e.to_string()))?;
                r
            };
            for (column, stored, computed) in [
                ("cumulative_top_ups", record.cumulative_top_ups, expected.cumulative_top_ups),
                ("cumulative_withdrawn", record.cumulative_withdrawn, expected.cumulative_withdrawn),
                ("cumulative_staked", record.cumulative_staked, expected.cumulative_staked),
                ("gross_return", record.gross_return, expected.gross_return),
                ("balance", record.balance, expected.balance),
                ("net_profit", record.net_profit, expected.net_profit),
            ] {
                if stored != computed {
                    return Err(fail(format!(
                        "{column} is {stored}, expected {computed}"
                    )));
                }
            }
        }

        debug!(
            rows = records.len(),
            capital = %totals.capital(),
            balance = %totals.balance,
            "Ledger reconciled"
        );
        Ok(totals)
    }

    /// Per-row field rules, independent of neighbours.
    fn check_shape(record: &CouponRecord) -> Result<(), String> {
        if record.top_up < Decimal::ZERO {
            return Err(format!("negative top-up {}", record.top_up));
        }
        if record.withdrawn < Decimal::ZERO {
            return Err(format!("negative withdrawal {}", record.withdrawn));
        }

        match record.outcome {
            Outcome::Pending | Outcome::Won | Outcome::Lost => {
                if record.stake < Decimal::ZERO {
                    return Err(format!("negative stake {}", record.stake));
                }
                if record.odds <= Decimal::ONE {
                    return Err(format!("odds {} must be greater than 1", record.odds));
                }
                if record.withdrawn != Decimal::ZERO {
                    return Err("bet row cannot carry a withdrawal".into());
                }
            }
            Outcome::Deposit => {
                if record.top_up <= Decimal::ZERO {
                    return Err("deposit row without an amount".into());
                }
                if record.stake != Decimal::ZERO || record.withdrawn != Decimal::ZERO {
                    return Err("deposit row with stake or withdrawal".into());
                }
            }
            Outcome::Withdrawal => {
                if record.withdrawn <= Decimal::ZERO {
                    return Err("withdrawal row without an amount".into());
                }
                if record.stake != Decimal::ZERO || record.top_up != Decimal::ZERO {
                    return Err("withdrawal row with stake or top-up".into());
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
