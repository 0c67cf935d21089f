use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Load balancer and monitoring check.
        .route("/health", get(handlers::health))
}
