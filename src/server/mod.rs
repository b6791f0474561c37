//! HTTP layer for the screenshot service.
//!
//! ```text
//!  request ─► TraceLayer ─► CORS ─► security headers ─► rate limit ─► handler
//!                                                                  │
//!                                     validate ─► ScreenshotService ┘
//! ```

pub mod handlers;
pub mod middleware;
pub mod routes;

use std::net::SocketAddr;

use tracing::info;

use crate::rate_limit::RateLimiter;
use crate::ScreenshotError;

pub use handlers::{ApiError, AppState, ErrorResponse, HealthResponse, AVAILABLE_ENDPOINTS};
pub use middleware::{client_key, SECURITY_HEADERS};
pub use routes::create_router;

/// Bind `address` and serve until `shutdown` resolves.
pub async fn serve<F>(
    address: &str,
    state: AppState,
    limiter: RateLimiter,
    cors_origins: Option<&[String]>,
    shutdown: F,
) -> Result<(), ScreenshotError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let cleanup = limiter.spawn_cleanup();
    let router = create_router(state, limiter, cors_origins);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let result = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await;

    cleanup.abort();
    result.map_err(ScreenshotError::from)
}
