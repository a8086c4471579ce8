//! Request Handlers
//!
//! The game-round handlers accept the request, hand it to a worker and
//! answer `200 OK` straight away. The random number itself only ever travels
//! over the bus.

use super::{middleware::SESSION_ID_HEADER, models::*};
use crate::{
    metrics::BridgeMetrics,
    worker::{RequestContext, WorkerPool},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub pool: WorkerPool,
    pub metrics: Arc<BridgeMetrics>,
}

impl AppState {
    pub fn new(pool: WorkerPool) -> Self {
        let metrics = pool.metrics().clone();
        Self { pool, metrics }
    }
}

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// GET /{route}/:game?boxId={id}&walletAddr={addr}
pub async fn random_number_handler(
    State(state): State<Arc<AppState>>,
    Path(game): Path<String>,
    Query(query): Query<RoundQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> StatusCode {
    let ctx = RequestContext::new(game, query.box_id(), query.wallet_addr(), session_id(&headers));

    info!(
        url_path = %uri.path(),
        box_id = %ctx.box_id,
        game = %ctx.game,
        wallet_addr = %ctx.wallet_addr,
        session_id = %ctx.session_id,
        "random number requested"
    );

    state.metrics.record_request();
    // Detached: the caller listens on the bus topic for the result
    drop(state.pool.dispatch(ctx));

    StatusCode::OK
}

/// GET /test/{route}?walletAddr={addr}
pub async fn test_random_number_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoundQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> StatusCode {
    let ctx = RequestContext::new(
        state.pool.settings().test_game.clone(),
        String::new(),
        query.wallet_addr(),
        session_id(&headers),
    );

    info!(
        url_path = %uri.path(),
        game = %ctx.game,
        wallet_addr = %ctx.wallet_addr,
        session_id = %ctx.session_id,
        "test random number requested"
    );

    state.metrics.record_test_request();
    drop(state.pool.dispatch_test(ctx));

    StatusCode::OK
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.to_prometheus_format(),
    )
}
