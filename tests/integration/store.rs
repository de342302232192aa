//! Persistence through the store and the dashboard.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use rust_decimal_macros::dec;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use recoup::config::AppConfig;
use recoup::dashboard::{build_router, DashboardState};
use recoup::engine::Ledger;
use recoup::storage::LedgerStore;
use recoup::strategy::OverBudgetPolicy;
use recoup::types::Outcome;

fn temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("recoup_it_{}", uuid::Uuid::new_v4()));
    dir
}

fn store_in(dir: &PathBuf) -> LedgerStore {
    LedgerStore::new(
        dir.join("ledger.csv"),
        dir.join("ledger_meta.json"),
        dir.join("backups"),
        dec!(100),
    )
}

async fn send(state: Arc<DashboardState>, method: Method, uri: &str, body: &str) -> StatusCode {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    build_router(state).oneshot(req).await.unwrap().status()
}

#[test]
fn test_session_survives_restart() {
    let dir = temp_dir();
    let store = store_in(&dir);

    let mut ledger = Ledger::new(dec!(100), OverBudgetPolicy::Warn);
    ledger.deposit(dec!(1000)).unwrap();
    ledger.place_coupon(dec!(100), dec!(3)).unwrap();
    ledger.resolve_pending(Outcome::Lost).unwrap();
    ledger.set_profit_target(dec!(150)).unwrap();
    store.save(&ledger.snapshot()).unwrap();

    let restored = Ledger::from_snapshot(store.load().unwrap().unwrap(), OverBudgetPolicy::Warn)
        .unwrap();
    assert_eq!(restored.balance(), dec!(-100));
    assert_eq!(restored.profit_target(), dec!(150));
    assert_eq!(
        restored.recommend_stake(dec!(3)).unwrap(),
        ledger.recommend_stake(dec!(3)).unwrap()
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn test_store_from_config() {
    let dir = temp_dir();
    let text = format!(
        r#"
[ledger]
data_file = "{}"
meta_file = "{}"
backup_dir = "{}"
profit_target = 75.0
legacy_initial_capital = 300.0
"#,
        dir.join("old.csv").display(),
        dir.join("old_meta.json").display(),
        dir.join("backups").display(),
    );
    let cfg = AppConfig::parse(&text).unwrap();
    let store = LedgerStore::from_config(&cfg.ledger);

    fs::create_dir_all(&dir).unwrap();
    fs::write(
        store.data_file(),
        "Kupon,Nazwa,Wynik,Stawka (S),Kurs\n1,Kupon #1,PRZEGRANA,\"50,00\",\"2,00\"\n",
    )
    .unwrap();
    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.profit_target, dec!(75));
    assert_eq!(snapshot.records[0].top_up, dec!(300));

    let ledger = Ledger::from_snapshot(snapshot, cfg.ledger.over_budget_policy).unwrap();
    assert_eq!(ledger.budget(), dec!(250));

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_api_mutations_are_persisted() {
    let dir = temp_dir();
    let store = store_in(&dir);
    let state = Arc::new(DashboardState::new(
        Ledger::default(),
        Some(store.clone()),
        "PLN",
    ));

    assert_eq!(
        send(state.clone(), Method::POST, "/api/deposit", r#"{"amount": 500}"#).await,
        StatusCode::OK
    );
    assert_eq!(
        send(
            state.clone(),
            Method::POST,
            "/api/coupons",
            r#"{"stake": 40, "odds": 2.5}"#
        )
        .await,
        StatusCode::CREATED
    );

    let on_disk = store.load().unwrap().unwrap();
    assert_eq!(on_disk.records.len(), 2);
    assert!(on_disk.records[1].is_pending());

    assert_eq!(
        send(state.clone(), Method::POST, "/api/backup", "").await,
        StatusCode::OK
    );
    assert_eq!(fs::read_dir(dir.join("backups")).unwrap().count(), 1);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_failed_save_rolls_back() {
    let dir = temp_dir();
    fs::create_dir_all(&dir).unwrap();
    // A plain file where the store expects a directory.
    let blocker = dir.join("blocker");
    fs::write(&blocker, "").unwrap();
    let store = LedgerStore::new(
        blocker.join("ledger.csv"),
        blocker.join("ledger_meta.json"),
        dir.join("backups"),
        dec!(100),
    );
    let state = Arc::new(DashboardState::new(Ledger::default(), Some(store), "PLN"));

    let status = send(state.clone(), Method::POST, "/api/deposit", r#"{"amount": 500}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.ledger.read().await.records().is_empty());

    let _ = fs::remove_dir_all(dir);
}
