use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct CleanupQuery {
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CleanupResponse {
    pub message: String,
    pub profiles_checked: usize,
    pub duplicates_removed: usize,
}

pub(super) async fn cleanup_duplicates(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let username = query
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    let report = state
        .cache
        .cleanup_duplicates(username)
        .await
        .map_err(|e| {
            tracing::error!(request_id = %req_id.0, error = %e, "duplicate cleanup failed");
            ApiError::new(req_id.0.clone(), "store_unavailable", "duplicate cleanup failed")
        })?;

    let message = match username {
        Some(username) => format!("Duplicate cleanup completed for {username}"),
        None => "Duplicate cleanup completed for all profiles".to_string(),
    };
    Ok(Json(CleanupResponse {
        message,
        profiles_checked: report.profiles_checked,
        duplicates_removed: report.duplicates_removed,
    }))
}
