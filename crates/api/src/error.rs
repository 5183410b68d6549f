use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::SarError;
use serde::Serialize;
use thiserror::Error;

/// Seconds a client should wait before retrying a busy row.
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with the row's lifecycle state.
    #[error("Conflict: {message}")]
    Conflict {
        code: &'static str,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    /// Row lock not acquired in time; safe to retry.
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, *code, message.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Busy(msg) => (StatusCode::SERVICE_UNAVAILABLE, "busy", msg.clone()),
            ApiError::BadGateway(msg) => {
                tracing::warn!("External service failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    "A downstream service is unavailable".into(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
        };

        let retryable = matches!(self, ApiError::Busy(_) | ApiError::BadGateway(_));
        let body = ErrorBody {
            error: error_code.into(),
            message,
            retryable,
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::Busy(_)) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

impl From<SarError> for ApiError {
    fn from(err: SarError) -> Self {
        let message = err.to_string();
        match err {
            SarError::Validation(msg) => ApiError::Validation(msg),
            SarError::NotFound(_) => ApiError::NotFound(message),
            SarError::AlreadyCompleted(_) => ApiError::Conflict {
                code: "already_completed",
                message,
            },
            SarError::IsErrored(_) => ApiError::Conflict {
                code: "request_errored",
                message,
            },
            SarError::Busy(_) => ApiError::Busy(message),
            SarError::ExternalService(msg) => ApiError::BadGateway(msg),
            SarError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        SarError::from(errors).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: SarError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_sar_error_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(status_of(SarError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(SarError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(SarError::AlreadyCompleted(id)), StatusCode::CONFLICT);
        assert_eq!(status_of(SarError::IsErrored(id)), StatusCode::CONFLICT);
        assert_eq!(status_of(SarError::Busy(id)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(SarError::ExternalService("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(SarError::Storage("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_busy_sets_retry_after() {
        let response = ApiError::from(SarError::Busy(Uuid::new_v4())).into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            RETRY_AFTER_SECS
        );

        let response = ApiError::NotFound("x".into()).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_conflicts_have_distinct_codes() {
        let id = Uuid::new_v4();
        match ApiError::from(SarError::AlreadyCompleted(id)) {
            ApiError::Conflict { code, .. } => assert_eq!(code, "already_completed"),
            other => panic!("unexpected {other:?}"),
        }
        match ApiError::from(SarError::IsErrored(id)) {
            ApiError::Conflict { code, .. } => assert_eq!(code, "request_errored"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            ApiError::NotFound("test".to_string()).to_string(),
            "Not found: test"
        );
        assert_eq!(
            ApiError::Validation("test".to_string()).to_string(),
            "Validation error: test"
        );
        assert_eq!(ApiError::Busy("test".to_string()).to_string(), "Busy: test");
    }
}
