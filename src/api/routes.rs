//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the API router. `route` is the first path segment of the game
/// endpoints, e.g. `rng` for `/rng/:game`.
pub fn create_router(state: Arc<AppState>, route: &str) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))

        // Game-round random numbers, delivered over the bus
        .route(&format!("/{}/:game", route), get(random_number_handler))

        // Delivery-path diagnostics, no oracle involved
        .route(&format!("/test/{}", route), get(test_random_number_handler))

        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))

        // Attach shared state
        .with_state(state)
}
