//! Worker-facing subject access request endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Principal;
use domain::models::{
    CompleteSubjectAccessRequest, CreateSubjectAccessRequest, CreatedResponse,
    SubjectAccessRequestResponse,
};

/// Create the subject access requests router.
///
/// Routes:
/// - POST /api/v1/subject-access-requests - Create a request
/// - GET /api/v1/subject-access-requests/unclaimed - Requests a worker may claim
/// - GET /api/v1/subject-access-requests/:id - Get one request
/// - PATCH /api/v1/subject-access-requests/:id/claim - Take the lease
/// - PATCH /api/v1/subject-access-requests/:id/complete - Mark completed
/// - GET /api/v1/subject-access-requests/:id/report - Download the report
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request))
        .route("/unclaimed", get(list_unclaimed))
        .route("/:id", get(get_request))
        .route("/:id/claim", patch(claim_request))
        .route("/:id/complete", patch(complete_request))
        .route("/:id/report", get(download_report))
}

/// POST /api/v1/subject-access-requests
async fn create_request(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateSubjectAccessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.requests.create(payload, principal.as_str()).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: request.id })))
}

/// GET /api/v1/subject-access-requests/unclaimed
async fn list_unclaimed(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectAccessRequestResponse>>, ApiError> {
    let requests = state.claims.find_unclaimed().await?;
    Ok(Json(
        requests
            .iter()
            .map(SubjectAccessRequestResponse::from)
            .collect(),
    ))
}

/// GET /api/v1/subject-access-requests/:id
async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubjectAccessRequestResponse>, ApiError> {
    let request = state.requests.get(id).await?;
    Ok(Json(SubjectAccessRequestResponse::from(&request)))
}

/// PATCH /api/v1/subject-access-requests/:id/claim
///
/// A request that cannot be claimed answers 200 with `not_claimed`, so a
/// worker can move on without treating it as a failure.
async fn claim_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.claims.claim(id).await?;
    Ok(Json(outcome))
}

/// PATCH /api/v1/subject-access-requests/:id/complete
///
/// The body is optional. When present it may carry the report's `objectUrl`.
async fn complete_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let payload = parse_complete_body(&body)?;
    state.claims.complete(id, payload.object_url).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_complete_body(body: &[u8]) -> Result<CompleteSubjectAccessRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CompleteSubjectAccessRequest::default());
    }

    let payload: CompleteSubjectAccessRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))?;
    payload.validate()?;
    Ok(payload)
}

/// GET /api/v1/subject-access-requests/:id/report
async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let contents = state.requests.download(id).await?;
    info!(request_id = %id, "Serving report");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pdf\"", id),
            ),
        ],
        contents,
    ))
}
