//! Router configuration.
//!
//! ```text
//! /screenshot   GET, POST  - Capture (rate limited)
//! /health       GET        - Liveness
//! /api/docs     GET        - Capability description
//! /metrics      GET        - Prometheus metrics
//! *                        - 404 with the endpoint list
//! ```

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::handlers::{
    docs_handler, health_handler, metrics_handler, not_found_handler, screenshot_get_handler,
    screenshot_post_handler, AppState,
};
use super::middleware::{rate_limit_middleware, security_headers_middleware};
use crate::config::is_valid_origin;
use crate::rate_limit::RateLimiter;

/// Build the application router.
///
/// `cors_origins` of `None` allows any origin; an empty list disables CORS.
pub fn create_router(state: AppState, limiter: RateLimiter, cors_origins: Option<&[String]>) -> Router {
    let screenshot_routes = Router::new()
        .route(
            "/screenshot",
            get(screenshot_get_handler).post(screenshot_post_handler),
        )
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .merge(screenshot_routes)
        .route("/health", get(health_handler))
        .route("/api/docs", get(docs_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(cors_origins: Option<&[String]>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match cors_origins {
        None => cors.allow_origin(Any),
        Some([]) => cors,
        Some(origins) => cors.allow_origin(parse_origins(origins)),
    }
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| {
            if !is_valid_origin(origin) {
                warn!("Ignoring invalid CORS origin: {}", origin);
                return None;
            }
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring invalid CORS origin {}: {}", origin, e);
                    None
                }
            }
        })
        .collect()
}
