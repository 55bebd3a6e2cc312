mod debug;
mod scrape;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use postpulse_core::AppConfig;
use postpulse_db::PostCache;
use postpulse_scraper::ScrapeBackend;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::export::JsonExporter;
use crate::middleware::request_id;

pub const SERVICE_NAME: &str = "postpulse-scraper";

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PostCache>,
    pub scraper: Arc<dyn ScrapeBackend>,
    pub limits: RequestLimits,
    pub exporter: Option<Arc<JsonExporter>>,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    /// Budget for the browser scrape behind one request. Cache reads and
    /// writes are not counted against it.
    pub scrape_timeout: Duration,
    pub max_posts: usize,
}

impl RequestLimits {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            scrape_timeout: Duration::from_secs(config.scrape_timeout_secs),
            max_posts: config.max_posts_per_request.max(1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                request_id: request_id.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "bad_request" => StatusCode::BAD_REQUEST,
            "store_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    service: &'static str,
    timestamp: DateTime<Utc>,
    store: &'static str,
    store_backend: &'static str,
}

/// Clamp a requested post count to `1..=max`, using `default` when absent.
pub(super) fn normalize_n_posts(requested: Option<i64>, default: usize, max: usize) -> usize {
    let requested = requested.map_or(default, |n| usize::try_from(n.max(1)).unwrap_or(max));
    requested.clamp(1, max.max(1))
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/scrape/profile/posts", get(scrape::profile_posts))
        .route("/scrape/hashtag/posts", get(scrape::hashtag_posts))
        .route(
            "/debug/cleanup-duplicates",
            post(debug::cleanup_duplicates),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.cache.store();
    let backend = store.backend();

    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                service: SERVICE_NAME,
                timestamp: Utc::now(),
                store: "ok",
                store_backend: backend,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, backend, "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    service: SERVICE_NAME,
                    timestamp: Utc::now(),
                    store: "unavailable",
                    store_backend: backend,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
