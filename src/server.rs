//! HTTP API for screenshot-based extraction.
//!
//! `POST /grab` with `{"url": "..."}` captures the page in a headless browser
//! and returns the [`ArticleData`] read from the screenshots. `GET /health`
//! answers `{"status":"ok"}`. CORS is open to any origin.
//!
//! Requests share only the gateway client and capture settings; every
//! request launches its own browser.

use crate::api::Gateway;
use crate::capture::PageCapture;
use crate::error::GrabError;
use crate::extract::extract_from_images;
use crate::models::ArticleData;
use crate::utils::validate_article_url;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Shared, read-only request state.
pub struct AppState<G, C> {
    pub gateway: Arc<G>,
    pub capture: C,
}

#[derive(Debug, Deserialize)]
pub struct GrabPayload {
    pub url: Option<String>,
}

/// Error body `{"error": "..."}` with a status chosen from the failure kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<GrabError> for ApiError {
    fn from(e: GrabError) -> Self {
        let status = match e {
            GrabError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Build the application router.
pub fn router<G, C>(state: AppState<G, C>) -> Router
where
    G: Gateway + 'static,
    C: PageCapture + 'static,
{
    Router::new()
        .route("/grab", post(grab::<G, C>))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[instrument(level = "info", skip_all)]
async fn grab<G: Gateway, C: PageCapture>(
    State(state): State<Arc<AppState<G, C>>>,
    payload: Result<Json<GrabPayload>, JsonRejection>,
) -> Result<Json<ArticleData>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "Rejected request body");
        ApiError::bad_request(e.body_text())
    })?;
    let url = match payload.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => return Err(ApiError::bad_request("URL is required")),
    };
    validate_article_url(&url)?;

    let t0 = Instant::now();
    let result = async {
        let frames = state.capture.capture_full_page(&url).await?;
        extract_from_images(state.gateway.as_ref(), frames).await
    }
    .await;

    match result {
        Ok(article) => {
            info!(%url, title = %article.title, elapsed_ms = t0.elapsed().as_millis() as u64, "Served article");
            Ok(Json(article))
        }
        Err(e) => {
            error!(%url, error = %e, "Failed to grab article content");
            Err(e.into())
        }
    }
}

/// Bind `listen` and serve until the process exits.
pub async fn serve<G, C>(listen: SocketAddr, state: AppState<G, C>) -> std::io::Result<()>
where
    G: Gateway + 'static,
    C: PageCapture + 'static,
{
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "Server listening");
    axum::serve(listener, router(state)).await
}
