//! Status API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::report::CycleReport;
use crate::engine::scheduler::{ScanScheduler, SchedulerState};
use crate::storage::QualifiedSink;
use crate::types::{QualifiedToken, ScannerError};

/// Default and maximum page size for `/api/qualified`.
const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub scheduler: Arc<ScanScheduler>,
    pub sink: Arc<dyn QualifiedSink>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(scheduler: Arc<ScanScheduler>) -> Self {
        Self {
            sink: scheduler.sink(),
            scheduler,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub state: SchedulerState,
    pub cycles_started: u64,
    pub ticks_skipped: u64,
    pub qualified: usize,
    pub uptime_secs: i64,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn internal(e: ScannerError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.scheduler.status().await;
    let qualified = state.sink.count().await.map_err(internal)?;

    Ok(Json(StatusResponse {
        name: status.name,
        state: status.state,
        cycles_started: status.cycles_started,
        ticks_skipped: status.ticks_skipped,
        qualified,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        last_cycle: status.last_cycle,
    }))
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleReport>> {
    Json(state.scheduler.recent_cycles().await)
}

/// GET /api/qualified?limit=N
pub async fn get_qualified(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<QualifiedToken>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let tokens = state.sink.ranked(limit).await.map_err(internal)?;
    Ok(Json(tokens))
}

/// GET /api/tokens/:id/history
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<QualifiedToken>>, ApiError> {
    let history = state.sink.history(&id).await.map_err(internal)?;
    if history.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("no history for {id}"),
            }),
        ));
    }
    Ok(Json(history))
}
