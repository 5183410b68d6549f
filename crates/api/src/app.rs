use axum::{middleware, routing::get, Router};
use domain::services::{
    AdminQueryService, ClaimCoordinator, Clock, DocumentStore, RequestService, RequestStore,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{admin, health, subject_access_requests};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub requests: RequestService,
    pub claims: ClaimCoordinator,
    pub admin: AdminQueryService,
    /// Present only when requests are stored in PostgreSQL.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RequestStore>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        pool: Option<PgPool>,
    ) -> Self {
        let settings = config.claim_settings();
        let admin = AdminQueryService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.watchdog.overdue_threshold(),
            settings.lease_duration,
        );
        let claims = ClaimCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&documents),
            Arc::clone(&clock),
            settings,
        );
        let requests = RequestService::new(store, documents, clock);

        Self {
            config,
            requests,
            claims,
            admin,
            pool,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // Build CORS layer based on configuration
    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Public routes (no principal required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .nest(
            "/api/v1/subject-access-requests",
            subject_access_requests::router(),
        )
        .nest("/api/v1/admin/subject-access-requests", admin::router())
        // Global middleware (order matters: bottom layers run first)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
