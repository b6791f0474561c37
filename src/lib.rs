//! # Snapshot Service
//!
//! An HTTP service that renders a web page in headless Chrome and returns the
//! result as an image.
//!
//! Every capture runs in a browser launched for that request alone: the page
//! is loaded at the requested viewport, screenshotted as a lossless bitmap and
//! re-encoded to the configured output format (JPEG by default). The browser is
//! torn down on every exit path, including timeouts.
//!
//! ## Pipeline
//!
//! ```text
//!   GET/POST /screenshot
//!        │
//!        ▼
//!   validator::validate ──► CaptureRequest
//!        │
//!        ▼
//!   ScreenshotService::capture  (bounded by the overall deadline)
//!        │  BrowserLauncher::acquire
//!        │  CaptureSession::navigate ─► wait policy
//!        │  CaptureSession::capture  ─► RawBitmap (PNG)
//!        │  CaptureSession::release
//!        ▼
//!   BitmapEncoder::encode ──► EncodedImage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapshot_service::{validate, CaptureDefaults, Config, ParamValue, RawCaptureParams, ScreenshotService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let raw = RawCaptureParams {
//!         url: Some(ParamValue::Text("https://example.com".to_string())),
//!         ..Default::default()
//!     };
//!     let request = validate(raw, &CaptureDefaults::from(&config))?;
//!
//!     let service = ScreenshotService::new(config);
//!     let result = service.capture(request).await?;
//!     println!("Captured {} bytes", result.image.bytes.len());
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! snapshot-service serve --port 3000
//! snapshot-service capture --url https://example.com --full-page
//! snapshot-service validate --config snapshot.json
//! ```

/// Service configuration and capture request types
pub mod config;

/// Error types and their HTTP classification
pub mod error;

/// Request parameter parsing and validation
pub mod validator;

/// Headless browser lifecycle: launch, navigate, capture, release
pub mod browser_session;

/// Bitmap re-encoding to the output format
pub mod encoder;

/// Capture orchestration under an overall deadline
pub mod screenshot_service;

/// Per-client fixed-window rate limiting
pub mod rate_limit;

/// HTTP server, routes and middleware
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// Prometheus metrics for the capture pipeline
pub mod metrics;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod tests;

pub use self::browser_session::{BrowserLauncher, CaptureSession, ChromeLauncher, SessionGuard};
pub use self::cli::{load_config, setup_logging, Cli, CliRunner, Commands};
pub use self::config::{
    create_browser_config, get_chrome_args, CaptureRegion, CaptureRequest, Config, Environment, OutputFormat,
    RateLimitSettings, Viewport, WaitPolicy,
};
pub use self::encoder::{BitmapEncoder, EncodedImage, RawBitmap};
pub use self::error::ScreenshotError;
pub use self::rate_limit::{RateLimitResult, RateLimiter};
pub use self::screenshot_service::{ScreenshotResult, ScreenshotService};
pub use self::validator::{
    validate, CaptureDefaults, CaptureOptions, Dimension, ParamValue, RawCaptureParams, ScreenshotBody,
    MAX_DIMENSION, MAX_QUALITY, MIN_DIMENSION, MIN_QUALITY,
};
