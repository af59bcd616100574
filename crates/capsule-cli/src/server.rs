//! HTTP adapter over [`CapsuleService`].
//!
//! Routes and JSON envelopes:
//! - `POST /api/capsules` -> 201 `{success, message, id}`
//! - `GET  /api/capsules?keyword&university&tags&minDatm&limit` -> `{success, count, results}`
//! - `GET  /api/capsules/{id}` -> `{success, capsule}`
//! - `POST /api/datm/calculate` -> `{success, datm, overall, grade}`
//! - `GET  /health` -> `{status, timestamp}`
//!
//! Failures are `{success: false, kind, error}` with a status derived from
//! the error kind.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use capsule_core::{PartialDatm, SearchRequest};
use capsule_store::{CapsuleService, StoreError};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<CapsuleService>>,
}

pub fn router(service: Arc<Mutex<CapsuleService>>) -> Router {
    let state = AppState { service };
    Router::new()
        .route("/api/capsules", post(create_capsule).get(search_capsules))
        .route("/api/capsules/{id}", get(get_capsule))
        .route("/api/datm/calculate", post(calculate_datm))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until SIGINT/SIGTERM.
pub async fn serve(service: CapsuleService, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr().context("failed to read bound address")?;
    tracing::info!("capsule API listening on http://{local}");
    eprintln!("capsule API listening on http://{local}");

    let service = Arc::new(Mutex::new(service));
    axum::serve(listener, router(Arc::clone(&service)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Err(e) = service.lock().await.checkpoint() {
        tracing::warn!("WAL checkpoint on shutdown failed: {e}");
    }
    tracing::info!("capsule API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

// --- Errors ---

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError(StoreError::InvalidInput(message.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StoreError::DuplicateKey(_) => StatusCode::CONFLICT,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        } else {
            tracing::debug!("request rejected: {}", self.0);
        }
        let body = json!({
            "success": false,
            "kind": self.0.kind(),
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

// --- Handlers ---

async fn create_capsule(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<Value>), ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::invalid(e.body_text()))?;
    let id = state.service.lock().await.create_capsule_json(payload)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "capsule created",
            "id": id,
        })),
    ))
}

/// Raw query string values. Numbers are parsed by hand so that an empty
/// `minDatm=` or `limit=` means "not supplied" rather than a parse error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    keyword: Option<String>,
    university: Option<String>,
    tags: Option<String>,
    min_datm: Option<String>,
    limit: Option<String>,
}

impl TryFrom<SearchParams> for SearchRequest {
    type Error = ApiError;

    fn try_from(params: SearchParams) -> std::result::Result<Self, ApiError> {
        let min_datm = match params.min_datm.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| ApiError::invalid(format!("minDatm is not a number: {raw}")))?,
            ),
        };
        let limit = match params.limit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                ApiError::invalid(format!("limit is not a non-negative integer: {raw}"))
            })?),
        };
        Ok(SearchRequest {
            keyword: params.keyword,
            university: params.university,
            tags: params.tags,
            min_datm,
            limit,
        })
    }
}

async fn search_capsules(
    State(state): State<AppState>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::invalid(e.body_text()))?;
    let request = SearchRequest::try_from(params)?;
    let found = state.service.lock().await.search_capsules(&request)?;
    Ok(Json(json!({
        "success": true,
        "count": found.count,
        "results": found.results,
    })))
}

async fn get_capsule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    let capsule = state.service.lock().await.get_capsule(&id)?;
    Ok(Json(json!({
        "success": true,
        "capsule": capsule,
    })))
}

async fn calculate_datm(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PartialDatm>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(partial) = payload.map_err(|e| ApiError::invalid(e.body_text()))?;
    let report = state.service.lock().await.compute_datm(&partial);
    Ok(Json(json!({
        "success": true,
        "datm": report.datm,
        "overall": report.overall,
        "grade": report.grade,
    })))
}

async fn health() -> Json<Value> {
    Json(json!(CapsuleService::health()))
}
