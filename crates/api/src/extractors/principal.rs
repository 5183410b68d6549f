//! Calling principal extractor.
//!
//! Authentication happens in front of this service; the gateway forwards the
//! authenticated user name in `X-Requested-By`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Header carrying the authenticated user name.
pub const PRINCIPAL_HEADER: &str = "X-Requested-By";

/// Longest accepted principal name, matching the `requested_by` column.
const MAX_PRINCIPAL_LENGTH: usize = 255;

/// The user on whose behalf the request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(value: Option<&str>) -> Result<Self, ApiError> {
        let name = value.map(str::trim).unwrap_or_default();

        if name.is_empty() {
            return Err(ApiError::Validation(format!(
                "The {} header is required",
                PRINCIPAL_HEADER
            )));
        }
        if name.len() > MAX_PRINCIPAL_LENGTH {
            return Err(ApiError::Validation(format!(
                "The {} header must be at most {} characters",
                PRINCIPAL_HEADER, MAX_PRINCIPAL_LENGTH
            )));
        }

        Ok(Principal(name.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok());

        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<Principal, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(PRINCIPAL_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Principal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_principal_is_trimmed() {
        let principal = extract(Some("  CASEWORKER_1 ")).await.unwrap();
        assert_eq!(principal.as_str(), "CASEWORKER_1");
    }

    #[tokio::test]
    async fn test_missing_or_blank_principal_rejected() {
        assert!(matches!(extract(None).await, Err(ApiError::Validation(_))));
        assert!(matches!(extract(Some("   ")).await, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_overlong_principal_rejected() {
        let long = "a".repeat(MAX_PRINCIPAL_LENGTH + 1);
        assert!(matches!(extract(Some(&long)).await, Err(ApiError::Validation(_))));
    }
}
