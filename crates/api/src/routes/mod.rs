//! API routes

pub mod billing;
pub mod health;
pub mod recommendations;
pub mod usage;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    auth::{require_auth, require_service_secret},
    state::AppState,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();
    let service_auth_state = state.service_auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Protected API routes - under /api/v1
    let protected_routes = Router::new()
        // Subscription
        .route("/subscription", get(billing::get_subscription))
        // Usage
        .route("/usage", get(usage::get_usage))
        .route("/usage/documents/check", get(usage::check_documents))
        .route("/usage/documents", post(usage::record_document))
        .route("/usage/tokens/check", post(usage::check_tokens))
        .route("/usage/tokens", post(usage::record_tokens))
        // Recommendations
        .route("/recommendations", post(recommendations::recommend))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Internal routes called by the billing backend, never by users
    let internal_routes = Router::new()
        .route("/billing/events", post(billing::ingest_event))
        .layer(middleware::from_fn_with_state(
            service_auth_state,
            require_service_secret,
        ));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", protected_routes)
        .nest("/internal", internal_routes)
        .with_state(state)
}
