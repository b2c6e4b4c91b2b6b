//! Fans list HTTP API.
//!
//! - GET /v1/users/{target_user_id}/fans
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::FansError;
use crate::metrics::Metrics;
use crate::model::{FansPage, FansPageRequest, UserId};
use crate::pagination::PaginationEngine;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: PaginationEngine,
    pub config: Arc<Config>,
    pub metrics: Metrics,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/users/{target_user_id}/fans", get(fans_list))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Query string of the fans endpoint. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FansQuery {
    pub cursor: i64,
    pub page_size: i32,
    pub boundary_fan_id: UserId,
}

/// Error body returned for failed requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub populator_pending: usize,
}

struct ApiError(FansError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            FansError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            FansError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn fans_list(
    State(state): State<Arc<AppState>>,
    Path(target_user_id): Path<UserId>,
    Query(query): Query<FansQuery>,
) -> Result<Json<FansPage>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("fans_list", request_id = %request_id, target_user_id);

    let req = FansPageRequest {
        target_user_id,
        cursor: query.cursor,
        page_size: query.page_size,
        boundary_fan_id: query.boundary_fan_id,
    };

    async move {
        let page = state.engine.get_fans_page(req).await.map_err(|e| {
            info!(code = e.code(), error = %e, "Fans list request rejected");
            ApiError(e)
        })?;
        info!(
            items = page.items.len(),
            is_end = page.is_end,
            source = page.source.as_str(),
            "Fans list request"
        );
        Ok(Json(page))
    }
    .instrument(span)
    .await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        populator_pending: state.engine.populator().pending(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
