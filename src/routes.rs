use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::builder::PackBuilder;
use crate::config::SourceConfig;
use crate::greeting;
use crate::store::PackStore;

pub struct AppState {
    pub store: Arc<PackStore>,
    pub builder: Arc<PackBuilder>,
    /// Re-read at the start of every refresh
    pub config_path: PathBuf,
    pub user_name: String,
    pub public_dir: PathBuf,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let public_dir = ServeDir::new(&state.public_dir);

    Router::new()
        .route("/pack", get(pack))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/greeting", get(greeting))
        .route("/health", get(health))
        .fallback_service(public_dir)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Failure payload shared by every endpoint: `{error, detail}` with a 500.
pub struct ApiError {
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn new(error: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            error,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.error, "detail": self.detail })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub ok: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub item_count: usize,
}

// Route handlers
pub async fn pack(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let pack = state
        .store
        .load()
        .await
        .map_err(|e| ApiError::new("Cannot read pack", e))?;

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(pack)).into_response())
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let config = SourceConfig::load(&state.config_path);

    let pack = state.builder.build(&config).await.map_err(|e| {
        error!("Refresh failed: {}", e);
        ApiError::new("Refresh failed", e)
    })?;

    Ok(Json(RefreshResponse {
        ok: true,
        updated_at: pack.updated_at,
        item_count: pack.items.len(),
    }))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "refreshing": state.builder.is_refreshing() }))
}

pub async fn greeting(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hour = chrono::Local::now().hour();
    Json(json!({ "text": greeting::generate(&state.user_name, hour) }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
