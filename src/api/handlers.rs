use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::store::postgres::SyncLogRow;
use crate::AppState;

#[derive(Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub job: &'static str,
}

#[derive(Deserialize)]
pub struct SyncLogParams {
    pub limit: Option<i64>,
}

/// POST /api/v1/sync/trigger — run one fetch cycle in the background.
/// Fire-and-forget: the cycle outcome lands in `sync_log`, not the response.
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<TriggerResponse>) {
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = crate::jobs::sync::run_sync_cycle(&state).await {
            tracing::warn!("manually triggered sync cycle failed: {:#}", e);
        }
    });
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "accepted",
            job: "sync",
        }),
    )
}

/// POST /api/v1/ingest/trigger — run one ingestion cycle in the background.
pub async fn trigger_ingest(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<TriggerResponse>) {
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = crate::jobs::ingest::run_ingest_cycle(&state).await {
            tracing::warn!("manually triggered ingestion cycle failed: {:#}", e);
        }
    });
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "accepted",
            job: "ingest",
        }),
    )
}

/// GET /api/v1/sync/log — recent sync attempts, newest first.
pub async fn list_sync_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncLogParams>,
) -> Result<Json<Vec<SyncLogRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let rows = state.db.recent_sync_logs(limit).await?;
    Ok(Json(rows))
}
