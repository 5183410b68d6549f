//! Admin API routes for subject access requests.
//!
//! Searching and summarising never change a row. Duplication is the only way
//! to retry a request that errored.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Principal;
use domain::models::{AdminSearchPage, AdminSearchQuery, AdminSummary, CreatedResponse};

/// Create the admin router.
///
/// Routes:
/// - GET /api/v1/admin/subject-access-requests - Filtered, paged search
/// - GET /api/v1/admin/subject-access-requests/summary - Counts only
/// - POST /api/v1/admin/subject-access-requests/:id/duplicate - Copy as a new pending request
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_requests))
        .route("/summary", get(summarise_requests))
        .route("/:id/duplicate", post(duplicate_request))
}

/// GET /api/v1/admin/subject-access-requests
///
/// Without `pageNumber` and `pageSize` every matching row is returned.
async fn search_requests(
    State(state): State<AppState>,
    Query(query): Query<AdminSearchQuery>,
) -> Result<Json<AdminSearchPage>, ApiError> {
    Ok(Json(state.admin.search(&query).await?))
}

/// GET /api/v1/admin/subject-access-requests/summary
async fn summarise_requests(
    State(state): State<AppState>,
    Query(query): Query<AdminSearchQuery>,
) -> Result<Json<AdminSummary>, ApiError> {
    Ok(Json(state.admin.summary(&query).await?))
}

/// POST /api/v1/admin/subject-access-requests/:id/duplicate
async fn duplicate_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let copy = state.requests.duplicate(id, principal.as_str()).await?;
    info!(
        original_id = %id,
        request_id = %copy.id,
        admin = %principal.as_str(),
        "Admin duplicated subject access request"
    );
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: copy.id })))
}
