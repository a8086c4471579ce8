//! Middleware Components
//!
//! CORS preflight handling and request tracking.

use axum::{
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, CorsLayer, ExposeHeaders};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Session header sent by the game frontend
pub const SESSION_ID_HEADER: &str = "owl-session-id";

/// Cross-origin policy for the game endpoints.
///
/// Every `OPTIONS` request is answered here with `200 OK`, no body, and the
/// allowed origin/headers/methods, without reaching any handler. Other
/// responses get `Access-Control-Allow-Origin` added.
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let allow_origin = if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .into_iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(SESSION_ID_HEADER)])
        .expose_headers(ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]))
}

/// Echo the caller's request ID, or mint one, on every response
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
