//! Common test utilities for integration tests.
//!
//! The router runs against the in-memory request store, a fixed clock and an
//! in-memory document store, so no external services are needed. Tests of
//! the PostgreSQL store connect to `TEST_DATABASE_URL` instead.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use domain::models::{NewSubjectAccessRequest, Status, Subject, SubjectAccessRequest};
use domain::services::{FixedClock, InMemoryDocumentStore, InMemoryRequestStore, RequestStore};
use fake::faker::number::en::NumberWithFormat;
use fake::Fake;
use sar_admin_api::{
    app::{create_app, AppState},
    config::Config,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const ADMIN: &str = "admin.user";
pub const WORKER: &str = "report-worker";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryRequestStore>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    /// A fresh router over this app's shared state.
    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    pub fn now(&self) -> DateTime<Utc> {
        domain::services::Clock::now(self.clock.as_ref())
    }

    /// Insert a row directly, bypassing the API.
    pub async fn seed(&self, status: Status, requested_at: DateTime<Utc>, case_ref: &str) -> Uuid {
        let mut row = pending_row(case_ref, requested_at);
        row.status = status;
        self.store.insert(&row).await.unwrap();
        row.id
    }
}

/// Build a test app with the clock fixed at 2024-06-01 09:00 UTC.
pub fn test_app() -> TestApp {
    test_app_with(&[])
}

/// Like [`test_app`], with configuration overrides such as
/// `("claims.lock_timeout_millis", "100")`.
pub fn test_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let mut all = vec![("storage.backend", "memory")];
    all.extend_from_slice(overrides);
    let config = Config::load_for_test(&all).expect("embedded defaults must load");

    let store = Arc::new(InMemoryRequestStore::new());
    let documents = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    ));

    let state = AppState::new(
        Arc::new(config),
        store.clone(),
        documents.clone(),
        clock.clone(),
        None,
    );

    TestApp {
        state,
        store,
        documents,
        clock,
    }
}

/// A random case reference such as `CASE-4821`.
pub fn case_reference() -> String {
    NumberWithFormat("CASE-####").fake()
}

/// A valid create payload for a prison subject.
pub fn create_payload(case_ref: &str) -> serde_json::Value {
    serde_json::json!({
        "dateFrom": "2023-01-01",
        "dateTo": "2023-12-31",
        "sarCaseReferenceNumber": case_ref,
        "services": "keyworker-api, offender-case-notes",
        "nomisId": "A1234BC"
    })
}

/// Build a JSON request carrying the principal header.
pub fn json_request_as(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    principal: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Requested-By", principal)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a request with no body.
pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a request with no body carrying the principal header.
pub fn empty_request_as(method: Method, uri: &str, principal: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Requested-By", principal)
        .body(Body::empty())
        .unwrap()
}

/// Parse response body as JSON.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

/// Raw response body bytes.
pub async fn response_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Connect to the test database named by `TEST_DATABASE_URL` and apply the
/// migrations.
///
/// Returns `None` when the variable is unset so database tests are skipped
/// on machines without PostgreSQL.
pub async fn create_test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    run_migrations(&pool).await;
    Some(pool)
}

/// Apply the persistence migrations. Already-applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) {
    sqlx::migrate!("../persistence/src/migrations")
        .run(pool)
        .await
        .expect("Failed to run migrations");
}

/// A pending row requested at `requested_at`, not yet inserted.
pub fn pending_row(case_ref: &str, requested_at: DateTime<Utc>) -> SubjectAccessRequest {
    SubjectAccessRequest::pending(
        NewSubjectAccessRequest {
            date_from: None,
            date_to: chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            sar_case_reference_number: case_ref.to_string(),
            services: "keyworker-api".to_string(),
            subject: Subject::Nomis("A1234BC".to_string()),
            requested_by: ADMIN.to_string(),
        },
        requested_at,
    )
}
