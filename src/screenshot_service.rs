//! Capture orchestration
//!
//! `ScreenshotService` runs one validated request through the pipeline
//! (acquire, navigate, capture, release, encode) under the request-wide
//! deadline and turns the outcome into metrics and log lines.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

use crate::browser_session::{BrowserLauncher, ChromeLauncher, SessionGuard};
use crate::config::{CaptureRequest, Config, OutputFormat};
use crate::encoder::{BitmapEncoder, EncodedImage, RawBitmap};
use crate::metrics::{record_capture, record_encoded_bytes, ActiveCaptureGuard};
use crate::ScreenshotError;

/// A finished capture
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    pub request_id: String,
    pub url: Url,
    pub image: EncodedImage,
    pub duration: Duration,
}

/// Screenshot service with one fresh browser per request
///
/// # Examples
///
/// ```rust,no_run
/// use snapshot_service::{validate, CaptureDefaults, Config, ParamValue, RawCaptureParams, ScreenshotService};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = ScreenshotService::new(config.clone());
///
///     let raw = RawCaptureParams {
///         url: Some(ParamValue::Text("https://example.com".to_string())),
///         ..Default::default()
///     };
///     let request = validate(raw, &CaptureDefaults::from(&config))?;
///     let result = service.capture(request).await?;
///     println!("Captured {} bytes", result.image.bytes.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ScreenshotService {
    launcher: Arc<dyn BrowserLauncher>,
    encoder: BitmapEncoder,
}

impl ScreenshotService {
    pub fn new(config: Config) -> Self {
        let format = config.output_format;
        Self::with_launcher(Arc::new(ChromeLauncher::new(config)), format)
    }

    pub fn with_launcher(launcher: Arc<dyn BrowserLauncher>, format: OutputFormat) -> Self {
        Self {
            launcher,
            encoder: BitmapEncoder::new(format),
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.encoder.format()
    }

    /// Capture `request`, giving up after `request.overall_timeout`.
    ///
    /// When the deadline fires the pipeline is dropped mid-step; the session
    /// guard then releases the browser in the background so this returns
    /// immediately with [`ScreenshotError::OverallTimeout`].
    pub async fn capture(&self, request: CaptureRequest) -> Result<ScreenshotResult, ScreenshotError> {
        let span = info_span!("capture", request_id = %request.id, url = %request.url);

        async move {
            let _active = ActiveCaptureGuard::new();
            let start = Instant::now();

            let outcome = tokio::select! {
                result = self.run_pipeline(&request) => result,
                _ = tokio::time::sleep(request.overall_timeout) => {
                    Err(ScreenshotError::OverallTimeout(request.overall_timeout))
                }
            };

            let duration = start.elapsed();
            match &outcome {
                Ok(image) => {
                    record_capture("success", duration);
                    record_encoded_bytes(image.bytes.len());
                    info!(
                        "Captured {}x{} {:?} ({} bytes) in {:?}",
                        image.width,
                        image.height,
                        image.format,
                        image.bytes.len(),
                        duration
                    );
                }
                Err(e) => {
                    record_capture(e.kind(), duration);
                    if e.is_client_error() {
                        warn!("Capture rejected: {}", e);
                    } else {
                        error!("Capture failed after {:?}: {}", duration, e);
                    }
                }
            }

            outcome.map(|image| ScreenshotResult {
                request_id: request.id.clone(),
                url: request.url.clone(),
                image,
                duration,
            })
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(&self, request: &CaptureRequest) -> Result<EncodedImage, ScreenshotError> {
        debug!("Launching browser");
        let session = self.launcher.acquire(request.viewport).await?;
        let mut guard = SessionGuard::new(session);

        let captured = Self::navigate_and_capture(&mut guard, request).await;
        guard.release().await;
        let raw = captured?;

        debug!("Encoding {} byte bitmap", raw.len());
        let encoder = self.encoder;
        let quality = request.quality;
        tokio::task::spawn_blocking(move || encoder.encode(&raw, quality))
            .await
            .map_err(|e| ScreenshotError::EncodingFailed(format!("encoder task failed: {e}")))?
    }

    async fn navigate_and_capture(guard: &mut SessionGuard, request: &CaptureRequest) -> Result<RawBitmap, ScreenshotError> {
        debug!("Navigating (wait for {})", request.wait_policy.as_str());
        guard
            .navigate(&request.url, request.wait_policy, request.navigation_timeout)
            .await?;

        debug!("Capturing {:?}", request.region());
        guard.capture(request.region()).await
    }
}
