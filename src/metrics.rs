//! Prometheus metrics for the capture pipeline.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

use crate::ScreenshotError;

/// Captures finished (counter, labels: outcome).
pub const CAPTURES_TOTAL: &str = "screenshot_captures_total";
/// Capture wall time from orchestration start (histogram).
pub const CAPTURE_DURATION_SECONDS: &str = "screenshot_capture_duration_seconds";
/// Captures currently running (gauge).
pub const ACTIVE_CAPTURES: &str = "screenshot_active_captures";
/// Size of encoded images (histogram).
pub const ENCODED_BYTES: &str = "screenshot_encoded_bytes";
/// Requests turned away by the rate limiter (counter).
pub const RATE_LIMITED_TOTAL: &str = "screenshot_rate_limited_total";

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, ScreenshotError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ScreenshotError::Configuration(format!("failed to install metrics recorder: {e}")))?;
    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Record a finished capture. `outcome` is `success` or an error kind.
pub fn record_capture(outcome: &'static str, duration: Duration) {
    counter!(CAPTURES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(CAPTURE_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_encoded_bytes(bytes: usize) {
    histogram!(ENCODED_BYTES).record(bytes as f64);
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

/// Holds the active-captures gauge up for as long as it lives
pub struct ActiveCaptureGuard;

impl ActiveCaptureGuard {
    pub fn new() -> Self {
        gauge!(ACTIVE_CAPTURES).increment(1.0);
        Self
    }
}

impl Default for ActiveCaptureGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveCaptureGuard {
    fn drop(&mut self) {
        gauge!(ACTIVE_CAPTURES).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_metrics_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_capture("success", Duration::from_millis(1200));
            record_capture("navigation_timeout", Duration::from_secs(30));
            record_encoded_bytes(48_000);
            record_rate_limited();
        });

        let output = handle.render();
        assert!(output.contains(r#"screenshot_captures_total{outcome="success"} 1"#));
        assert!(output.contains(r#"screenshot_captures_total{outcome="navigation_timeout"} 1"#));
        assert!(output.contains("screenshot_rate_limited_total 1"));
        assert!(output.contains(CAPTURE_DURATION_SECONDS));
    }

    #[test]
    fn test_active_capture_guard() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let first = ActiveCaptureGuard::new();
            let second = ActiveCaptureGuard::new();
            drop(first);
            assert!(handle.render().contains("screenshot_active_captures 1"));
            drop(second);
            assert!(handle.render().contains("screenshot_active_captures 0"));
        });
    }

    #[test]
    fn test_metric_names_are_snake_case() {
        for name in [CAPTURES_TOTAL, CAPTURE_DURATION_SECONDS, ACTIVE_CAPTURES, ENCODED_BYTES, RATE_LIMITED_TOTAL] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
