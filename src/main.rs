//! RECOUP: loss-recovery staking ledger
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the ledger from disk (or starts fresh), then serves the
//! dashboard API until Ctrl+C, or prints a one-shot summary when the
//! server is disabled.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

use recoup::config;
use recoup::dashboard::{self, DashboardState};
use recoup::engine::Ledger;
use recoup::storage::LedgerStore;
use recoup::strategy::RecoveryCalculator;
use recoup::types::{format_currency, StakeRecommendation};

const BANNER: &str = r#"
 ____  _____ ____ ___  _   _ ____
|  _ \| ____/ ___/ _ \| | | |  _ \
| |_) |  _|| |  | | | | | | | |_) |
|  _ <| |__| |__| |_| | |_| |  __/
|_| \_\_____\____\___/ \___/|_|

  Loss-recovery staking ledger
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = config::AppConfig::path_from_env();
    let mut cfg = config::AppConfig::load(&config_path)?;
    cfg.apply_env_overrides()?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        data_file = %cfg.ledger.data_file.display(),
        profit_target = %cfg.ledger.profit_target,
        currency = %cfg.ledger.currency,
        policy = ?cfg.ledger.over_budget_policy,
        "RECOUP starting up"
    );

    // -- Restore or create the ledger ------------------------------------

    let store = LedgerStore::from_config(&cfg.ledger);
    let calculator = RecoveryCalculator::new(cfg.ledger.recovery());
    let ledger = match store.load()? {
        Some(snapshot) => {
            let ledger = Ledger::from_snapshot(snapshot, cfg.ledger.over_budget_policy)
                .with_context(|| {
                    format!("Ledger in {} is inconsistent", store.data_file().display())
                })?
                .with_calculator(calculator);
            info!(
                rows = ledger.records().len(),
                capital = %ledger.capital(),
                balance = %ledger.balance(),
                policy = ?ledger.policy(),
                "Resumed from saved ledger"
            );
            ledger
        }
        None => {
            let ledger = Ledger::new(cfg.ledger.profit_target, cfg.ledger.over_budget_policy)
                .with_calculator(calculator);
            info!(
                profit_target = %ledger.profit_target(),
                policy = ?ledger.policy(),
                "Fresh start"
            );
            ledger
        }
    };

    if !cfg.server.enabled {
        print_summary(&ledger, &cfg.ledger.currency);
        return Ok(());
    }

    let state = Arc::new(DashboardState::new(
        ledger,
        Some(store),
        cfg.ledger.currency.clone(),
    ));
    info!("Serving dashboard. Press Ctrl+C to stop.");
    dashboard::serve(state, cfg.server.port).await?;

    info!("RECOUP shut down cleanly.");
    Ok(())
}

/// Print a human-readable summary of the ledger.
fn print_summary(ledger: &Ledger, currency: &str) {
    let summary = ledger.summary();
    println!("{summary}");
    println!("Status:    {}", summary.game_status());
    println!("Capital:   {}", format_currency(summary.capital, currency));
    println!("Balance:   {}", format_currency(summary.balance, currency));
    println!("Budget:    {}", format_currency(summary.budget, currency));
    println!(
        "To goal:   {}",
        format_currency(summary.remaining_to_goal(), currency)
    );

    if let Some(pending) = ledger.pending() {
        println!("Pending:   {pending}");
        return;
    }
    if summary.capital > Decimal::ZERO {
        if let Ok(StakeRecommendation::Stake(stake)) =
            ledger.recommend_stake(dec!(2))
        {
            println!(
                "Next stake at odds 2.00: {}",
                format_currency(stake, currency)
            );
        }
    }
    if ledger.goal_reached() {
        println!("Profit target reached.");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("recoup=info"));

    let json_logging = std::env::var("RECOUP_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
