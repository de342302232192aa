//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! Every mutation runs on a clone of the ledger under the write lock and is
//! only committed once the store has saved it.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::engine::{CouponRequest, Ledger};
use crate::storage::LedgerStore;
use crate::types::{
    CouponRecord, GameStatus, LedgerError, LedgerSummary, Outcome, OutcomePreview,
    PlacementReceipt, StakeRecommendation, Transaction,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub ledger: RwLock<Ledger>,
    /// None runs the ledger in memory only.
    pub store: Option<LedgerStore>,
    pub currency: String,
}

impl DashboardState {
    pub fn new(ledger: Ledger, store: Option<LedgerStore>, currency: impl Into<String>) -> Self {
        Self {
            ledger: RwLock::new(ledger),
            store,
            currency: currency.into(),
        }
    }

    /// Apply `op` to a copy of the ledger, save it, then commit.
    pub async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Ledger) -> Result<T, LedgerError>,
    ) -> Result<T, ApiError> {
        let mut ledger = self.ledger.write().await;
        let mut draft = ledger.clone();
        let out = op(&mut draft)?;
        if let Some(store) = &self.store {
            store.save(&draft.snapshot()).map_err(ApiError::Storage)?;
        }
        *ledger = draft;
        Ok(out)
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Storage(anyhow::Error),
    NoStore,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Ledger(err) => {
                let status = match &err {
                    LedgerError::PendingCouponExists { .. } | LedgerError::NoPendingCoupon => {
                        StatusCode::CONFLICT
                    }
                    LedgerError::Inconsistent { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                if status.is_server_error() {
                    error!(error = %err, "Ledger error");
                } else {
                    warn!(kind = err.kind(), error = %err, "Request rejected");
                }
                (status, err.kind(), err.to_string())
            }
            ApiError::Storage(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
            }
            ApiError::NoStore => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_not_configured",
                "The ledger is running without a store".to_string(),
            ),
        };

        let body = ErrorBody {
            error: kind.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceCouponBody {
    pub label: Option<String>,
    pub stake: Decimal,
    pub odds: Decimal,
    #[serde(default)]
    pub top_up: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmendCouponBody {
    pub label: Option<String>,
    pub stake: Decimal,
    pub odds: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveBody {
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmountBody {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetBody {
    pub profit_target: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationQuery {
    pub odds: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewQuery {
    pub stake: Decimal,
    pub odds: Decimal,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub summary: LedgerSummary,
    pub game_status: GameStatus,
    pub goal_reached: bool,
    pub remaining_to_goal: Decimal,
    pub currency: String,
    pub pending: Option<CouponRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub odds: Decimal,
    pub goal_reached: bool,
    /// None once the goal is reached.
    pub stake: Option<Decimal>,
    /// Deposit needed before `stake` fits the budget.
    pub minimum_top_up: Decimal,
    pub budget: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub record: CouponRecord,
    pub summary: LedgerSummary,
    pub goal_reached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResponse {
    pub path: String,
}

fn status_of(ledger: &Ledger, currency: &str) -> StatusResponse {
    let summary = ledger.summary();
    StatusResponse {
        game_status: summary.game_status(),
        goal_reached: summary.goal_reached(),
        remaining_to_goal: summary.remaining_to_goal(),
        currency: currency.to_string(),
        pending: ledger.pending().cloned(),
        summary,
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let ledger = state.ledger.read().await;
    Json(status_of(&ledger, &state.currency))
}

/// GET /api/coupons
pub async fn get_coupons(State(state): State<AppState>) -> Json<Vec<CouponRecord>> {
    let ledger = state.ledger.read().await;
    Json(ledger.records().to_vec())
}

/// GET /api/transactions
pub async fn get_transactions(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    let ledger = state.ledger.read().await;
    Json(ledger.transactions())
}

/// GET /api/recommendation?odds=
pub async fn get_recommendation(
    State(state): State<AppState>,
    Query(q): Query<RecommendationQuery>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let ledger = state.ledger.read().await;
    let recommendation = ledger.recommend_stake(q.odds)?;
    let (stake, minimum_top_up) = match recommendation {
        StakeRecommendation::GoalReached => (None, Decimal::ZERO),
        StakeRecommendation::Stake(s) => (Some(s), ledger.minimum_top_up(s)),
    };
    Ok(Json(RecommendationResponse {
        odds: q.odds,
        goal_reached: stake.is_none(),
        stake,
        minimum_top_up,
        budget: ledger.budget(),
    }))
}

/// GET /api/preview?stake=&odds=
pub async fn get_preview(
    State(state): State<AppState>,
    Query(q): Query<PreviewQuery>,
) -> Result<Json<OutcomePreview>, ApiError> {
    let ledger = state.ledger.read().await;
    Ok(Json(ledger.preview(q.stake, q.odds)?))
}

/// POST /api/coupons
pub async fn place_coupon(
    State(state): State<AppState>,
    Json(body): Json<PlaceCouponBody>,
) -> Result<(StatusCode, Json<PlacementReceipt>), ApiError> {
    let mut request = CouponRequest::new(body.stake, body.odds).with_top_up(body.top_up);
    if let Some(label) = body.label {
        request = request.with_label(label);
    }
    let receipt = state.mutate(|l| l.place(request)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// PUT /api/coupons/pending
pub async fn amend_pending(
    State(state): State<AppState>,
    Json(body): Json<AmendCouponBody>,
) -> Result<Json<PlacementReceipt>, ApiError> {
    let receipt = state
        .mutate(|l| l.amend_pending(body.label, body.stake, body.odds))
        .await?;
    Ok(Json(receipt))
}

/// DELETE /api/coupons/pending
pub async fn cancel_pending(
    State(state): State<AppState>,
) -> Result<Json<CouponRecord>, ApiError> {
    Ok(Json(state.mutate(|l| l.cancel_pending()).await?))
}

/// POST /api/coupons/pending/resolve
pub async fn resolve_pending(
    State(state): State<AppState>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let response = state
        .mutate(|l| {
            let record = l.resolve_pending(body.outcome)?;
            Ok(ResolveResponse {
                record,
                summary: l.summary(),
                goal_reached: l.goal_reached(),
            })
        })
        .await?;
    Ok(Json(response))
}

/// POST /api/deposit
pub async fn deposit(
    State(state): State<AppState>,
    Json(body): Json<AmountBody>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(state.mutate(|l| l.deposit(body.amount)).await?))
}

/// POST /api/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Json(body): Json<AmountBody>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(state.mutate(|l| l.withdraw(body.amount)).await?))
}

/// PUT /api/target
pub async fn set_target(
    State(state): State<AppState>,
    Json(body): Json<TargetBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .mutate(|l| l.set_profit_target(body.profit_target))
        .await?;
    let ledger = state.ledger.read().await;
    Ok(Json(status_of(&ledger, &state.currency)))
}

/// POST /api/backup
pub async fn backup(State(state): State<AppState>) -> Result<Json<BackupResponse>, ApiError> {
    let store = state.store.as_ref().ok_or(ApiError::NoStore)?;
    // Hold the read lock so no save lands mid-copy.
    let _ledger = state.ledger.read().await;
    let path = store.backup().map_err(ApiError::Storage)?;
    Ok(Json(BackupResponse {
        path: path.display().to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
