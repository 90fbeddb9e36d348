use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Build the admin API router.
/// All routes are relative — the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/trigger", post(handlers::trigger_sync))
        .route("/ingest/trigger", post(handlers::trigger_ingest))
        .route("/sync/log", get(handlers::list_sync_logs))
        .layer(middleware::from_fn(admin_auth))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates `X-Admin-Key` (or a Bearer token) against the
/// configured admin key. Returns 401 if missing/invalid, 500 if no key is
/// configured at all.
async fn admin_auth(req: Request, next: Next) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    let expected = std::env::var("PVSYNC_ADMIN_KEY").map_err(|_| {
        tracing::error!("PVSYNC_ADMIN_KEY is not set; admin API is unusable");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match provided_key {
        Some(k) if k == expected => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("admin API: invalid key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("admin API: missing X-Admin-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
