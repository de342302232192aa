//! Full sessions driven through the public `Ledger` API.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use recoup::engine::{CouponRequest, Ledger};
use recoup::strategy::OverBudgetPolicy;
use recoup::types::{GameStatus, LedgerError, Outcome, StakeRecommendation, TransactionKind};

fn funded(capital: Decimal) -> Ledger {
    let mut ledger = Ledger::new(dec!(100), OverBudgetPolicy::Warn);
    ledger.deposit(capital).unwrap();
    ledger
}

#[test]
fn test_recovery_after_a_loss() {
    let mut ledger = funded(dec!(1000));
    assert_eq!(ledger.goal(), dec!(1100));

    ledger.place_coupon(dec!(100), dec!(3.0)).unwrap();
    ledger.resolve_pending(Outcome::Lost).unwrap();
    assert_eq!(ledger.balance(), dec!(-100));
    assert_eq!(ledger.budget(), dec!(900));
    assert_eq!(ledger.summary().game_status(), GameStatus::PlayingCapital);

    let stake = ledger.recommend_stake(dec!(3.0)).unwrap();
    assert_eq!(stake, StakeRecommendation::Stake(dec!(100.00)));

    ledger.place_coupon(dec!(100), dec!(3.0)).unwrap();
    let won = ledger.resolve_pending(Outcome::Won).unwrap();
    assert_eq!(won.gross_return, dec!(300));
    assert_eq!(ledger.balance(), dec!(100));
    assert_eq!(ledger.budget(), dec!(1100));
    assert!(ledger.goal_reached());
    assert_eq!(
        ledger.recommend_stake(dec!(2)).unwrap(),
        StakeRecommendation::GoalReached
    );
}

#[test]
fn test_deposit_raises_goal_not_balance() {
    let mut ledger = funded(dec!(1000));
    ledger.deposit(dec!(500)).unwrap();
    assert_eq!(ledger.goal(), dec!(1600));
    assert_eq!(ledger.balance(), Decimal::ZERO);
    assert_eq!(ledger.profit_target(), dec!(100));
}

#[test]
fn test_pending_guards() {
    let mut ledger = funded(dec!(1000));
    assert_eq!(
        ledger.resolve_pending(Outcome::Won).unwrap_err(),
        LedgerError::NoPendingCoupon
    );

    ledger.place_coupon(dec!(50), dec!(2)).unwrap();
    let err = ledger.place_coupon(dec!(50), dec!(2)).unwrap_err();
    assert!(matches!(err, LedgerError::PendingCouponExists { .. }));
    assert!(matches!(
        ledger.withdraw(dec!(10)).unwrap_err(),
        LedgerError::PendingCouponExists { .. }
    ));
    assert!(matches!(
        ledger.recommend_stake(dec!(2)).unwrap_err(),
        LedgerError::PendingCouponExists { .. }
    ));
}

#[test]
fn test_raising_target_reopens_the_game() {
    let mut ledger = funded(dec!(1000));
    ledger.place_coupon(dec!(100), dec!(2.5)).unwrap();
    ledger.resolve_pending(Outcome::Won).unwrap();
    assert_eq!(ledger.net_profit(), dec!(150));
    assert!(ledger.goal_reached());

    ledger.set_profit_target(dec!(200)).unwrap();
    assert!(!ledger.goal_reached());
    assert_eq!(
        ledger.recommend_stake(dec!(2)).unwrap(),
        StakeRecommendation::Stake(dec!(50.00))
    );
}

#[test]
fn test_first_coupon_funded_on_placement() {
    let mut ledger = Ledger::new(dec!(100), OverBudgetPolicy::Warn);
    let receipt = ledger
        .place(
            CouponRequest::new(dec!(50), dec!(3))
                .with_label("Opening bet")
                .with_top_up(dec!(200)),
        )
        .unwrap();
    assert!(receipt.alert.is_none());
    assert_eq!(receipt.record.label, "Opening bet");
    assert_eq!(ledger.capital(), dec!(200));

    ledger.resolve_pending(Outcome::Lost).unwrap();
    let txs = ledger.transactions();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].kind, TransactionKind::Deposit);
    assert_eq!(txs[0].amount, dec!(200));
}

#[test]
fn test_over_budget_alert_and_policy() {
    let mut warn = funded(dec!(100));
    let receipt = warn.place_coupon(dec!(150), dec!(2)).unwrap();
    let alert = receipt.alert.unwrap();
    assert_eq!(alert.shortfall, dec!(50));

    let mut strict = Ledger::new(dec!(100), OverBudgetPolicy::Reject);
    strict.deposit(dec!(100)).unwrap();
    let err = strict.place_coupon(dec!(150), dec!(2)).unwrap_err();
    assert!(matches!(err, LedgerError::StakeExceedsBudget { .. }));
    assert!(strict.pending().is_none());
}

#[test]
fn test_withdraw_profit_then_continue() {
    let mut ledger = funded(dec!(1000));
    ledger.place_coupon(dec!(100), dec!(3)).unwrap();
    ledger.resolve_pending(Outcome::Won).unwrap();
    assert_eq!(ledger.budget(), dec!(1200));

    ledger.withdraw(dec!(1200)).unwrap();
    assert_eq!(ledger.budget(), Decimal::ZERO);
    assert_eq!(ledger.capital(), dec!(-200));
    assert!(ledger.withdraw(dec!(0.01)).is_err());

    let kinds: Vec<_> = ledger.transactions().iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TransactionKind::Deposit, TransactionKind::Withdrawal]);
}

#[test]
fn test_amend_and_cancel_pending() {
    let mut ledger = funded(dec!(1000));
    ledger.place_coupon(dec!(100), dec!(3)).unwrap();
    let receipt = ledger
        .amend_pending(Some("Derby".into()), dec!(120), dec!(2.5))
        .unwrap();
    assert_eq!(receipt.record.stake, dec!(120));
    assert_eq!(receipt.record.label, "Derby");

    let cancelled = ledger.cancel_pending().unwrap();
    assert_eq!(cancelled.index, 2);
    assert!(ledger.pending().is_none());
    assert_eq!(ledger.next_index(), 2);
    assert_eq!(ledger.budget(), dec!(1000));
}
