//! HTTP request handlers for the screenshot API.
//!
//! # Endpoints
//!
//! - `GET /screenshot?url=...` - Capture from query parameters
//! - `POST /screenshot` - Capture from a JSON body
//! - `GET /health` - Liveness check
//! - `GET /api/docs` - Capability description
//! - `GET /metrics` - Prometheus exposition

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::screenshot_service::{ScreenshotResult, ScreenshotService};
use crate::validator::{validate, CaptureDefaults, RawCaptureParams, ScreenshotBody};
use crate::ScreenshotError;

/// Endpoints listed in 404 responses and the docs
pub const AVAILABLE_ENDPOINTS: [&str; 5] = [
    "GET /screenshot",
    "POST /screenshot",
    "GET /health",
    "GET /api/docs",
    "GET /metrics",
];

// =============================================================================
// Application State
// =============================================================================

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScreenshotService>,
    pub defaults: CaptureDefaults,
    /// `Cache-Control` max-age for successful captures
    pub cache_max_age: u32,
    /// Include debug details in error bodies
    pub development: bool,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: ScreenshotService, config: &Config) -> Self {
        Self {
            service: Arc::new(service),
            defaults: CaptureDefaults::from(config),
            cache_max_age: config.cache_max_age,
            development: config.is_development(),
            metrics: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn api_error(&self, error: ScreenshotError) -> ApiError {
        ApiError {
            error,
            development: self.development,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub kind: &'static str,

    /// Debug representation, development mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since the server started
    pub uptime: f64,
}

/// A [`ScreenshotError`] on its way to the client
#[derive(Debug)]
pub struct ApiError {
    pub error: ScreenshotError,
    pub development: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error, message) = match &self.error {
            ScreenshotError::InvalidBody(detail) => ("Invalid JSON body".to_string(), Some(detail.clone())),
            e if e.is_client_error() => (e.to_string(), None),
            e => ("Failed to capture screenshot".to_string(), Some(e.to_string())),
        };

        // Server errors were already logged inside the capture span
        if status.is_client_error() {
            warn!(kind = self.error.kind(), status = status.as_u16(), "Client error: {}", self.error);
        }

        let body = ErrorResponse {
            error,
            message,
            kind: self.error.kind(),
            details: self.development.then(|| format!("{:?}", self.error)),
        };

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle `GET /screenshot`.
///
/// Query parameters: `url` (required), `width`, `height`, `quality`,
/// `fullPage`, `waitUntil`, `timeout`.
pub async fn screenshot_get_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    capture(&state, RawCaptureParams::from_query(&query)).await
}

/// Handle `POST /screenshot` with `{"url": ..., "options": {...}}`.
pub async fn screenshot_post_handler(
    State(state): State<AppState>,
    body: Result<Json<ScreenshotBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| state.api_error(ScreenshotError::InvalidBody(e.body_text())))?;
    capture(&state, body.into()).await
}

async fn capture(state: &AppState, raw: RawCaptureParams) -> Result<Response, ApiError> {
    let request = validate(raw, &state.defaults).map_err(|e| state.api_error(e))?;
    debug!(request_id = %request.id, "Validated capture request for {}", request.url);

    let result = state.service.capture(request).await.map_err(|e| state.api_error(e))?;
    Ok(image_response(result, state.cache_max_age))
}

fn image_response(result: ScreenshotResult, cache_max_age: u32) -> Response {
    let ScreenshotResult { url, image, duration, .. } = result;
    let (format, width, height, length) = (image.format, image.width, image.height, image.bytes.len());

    let mut response = Response::new(Body::from(image.bytes));
    let headers = response.headers_mut();

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.mime_type()));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={cache_max_age}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"screenshot.{}\"", format.extension())) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(url.as_str()) {
        headers.insert("x-screenshot-url", value);
    }
    headers.insert("x-screenshot-width", HeaderValue::from(width));
    headers.insert("x-screenshot-height", HeaderValue::from(height));
    headers.insert("x-render-time-ms", HeaderValue::from(duration.as_millis() as u64));

    response
}

/// Handle `GET /health`.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// Handle `GET /api/docs`.
pub async fn docs_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let defaults = &state.defaults;
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /screenshot": {
                "description": "Capture a screenshot of a URL",
                "parameters": {
                    "url": "Target URL, http or https (required)",
                    "width": format!("Viewport width, {}-{} (default {})", crate::MIN_DIMENSION, crate::MAX_DIMENSION, defaults.viewport.width),
                    "height": format!("Viewport height, {}-{} (default {})", crate::MIN_DIMENSION, crate::MAX_DIMENSION, defaults.viewport.height),
                    "quality": format!("Output quality, {}-{} (default {})", crate::MIN_QUALITY, crate::MAX_QUALITY, defaults.quality),
                    "fullPage": "Capture the full scrollable page (default false)",
                    "waitUntil": "load | domcontentloaded | networkidle (default networkidle)",
                    "timeout": format!(
                        "Navigation timeout in ms, clamped to {}-{} (default {})",
                        crate::validator::MIN_NAVIGATION_TIMEOUT_MS,
                        crate::validator::max_navigation_timeout_ms(defaults.overall_timeout),
                        defaults.navigation_timeout.as_millis()
                    ),
                },
                "output": state.service.output_format().mime_type(),
            },
            "POST /screenshot": {
                "description": "Same as GET with a JSON body",
                "body": {"url": "string", "options": {"width": "number", "height": "number", "quality": "number", "fullPage": "boolean", "waitUntil": "string", "timeout": "number"}},
            },
            "GET /health": {"description": "Service liveness"},
            "GET /api/docs": {"description": "This document"},
            "GET /metrics": {"description": "Prometheus metrics"},
        },
    }))
}

/// Handle `GET /metrics`.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Metrics exporter not installed" })),
        )
            .into_response(),
    }
}

/// Fallback for unmatched routes.
pub async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "availableEndpoints": AVAILABLE_ENDPOINTS,
        })),
    )
        .into_response()
}
