use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use hookrelay_core::engine::RelayEngine;

use crate::auth::{auth_middleware, AuthMode};
use crate::routes::{ingest, operator};

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    pub auth_mode: Arc<AuthMode>,
}

/// Creates the Axum router with the ingest gateway and operator control
/// plane mounted. The ingest gateway sits outside `auth_middleware` — its
/// authenticity comes from per-endpoint HMAC verification, not a bearer
/// token. Only the operator router is ADMIN-gated.
pub fn create_app(engine: Arc<RelayEngine>, auth_mode: AuthMode) -> Router {
    let auth_mode = Arc::new(auth_mode);

    let ingest_routes = Router::new()
        .route("/healthz", get(ingest::healthz))
        .route("/ingest/{endpoint_id}", post(ingest::ingest))
        .with_state(Arc::clone(&engine));

    let endpoint_routes = Router::new()
        .route("/", get(operator::list_endpoints).post(operator::create_endpoint))
        .route(
            "/{endpoint_id}",
            get(operator::get_endpoint)
                .patch(operator::update_endpoint)
                .delete(operator::delete_endpoint),
        )
        .route("/{endpoint_id}/rotate-secret", post(operator::rotate_secret))
        .route("/{endpoint_id}/test", post(operator::test_endpoint));

    let delivery_routes = Router::new()
        .route("/recent", get(operator::list_recent))
        .route("/", get(operator::list_filtered))
        .route("/{endpoint_id}/{delivery_id}/retry", post(operator::retry_delivery))
        .route("/bulk/retry", post(operator::bulk_retry))
        .route("/bulk/delete", post(operator::bulk_delete))
        .route("/bulk/archive", post(operator::bulk_archive))
        .route("/bulk/status", patch(operator::bulk_update_status));

    let dlq_routes = Router::new()
        .route("/", get(operator::list_dlq))
        .route("/{endpoint_id}/{delivery_id}/replay", post(operator::replay_dlq))
        .route("/{endpoint_id}/{delivery_id}", delete(operator::delete_dlq))
        .route("/bulk/delete", post(operator::bulk_delete_dlq));

    let observability_routes = Router::new()
        .route("/stats", get(operator::stats))
        .route("/health-alerts", get(operator::health_alerts))
        .route("/analytics", get(operator::analytics));

    let system_routes = Router::new()
        .route(
            "/settings",
            get(operator::get_system_settings).patch(operator::update_system_settings),
        )
        .route("/test-connection", post(operator::test_system_connection));

    let operator_routes = Router::new()
        .nest("/endpoints", endpoint_routes)
        .nest("/deliveries", delivery_routes)
        .nest("/dlq", dlq_routes)
        .nest("/system", system_routes)
        .merge(observability_routes)
        .with_state(Arc::clone(&engine))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&auth_mode),
            auth_middleware,
        ));

    Router::new().merge(ingest_routes).nest("/api", operator_routes)
}
