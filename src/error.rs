use std::time::Duration;
use thiserror::Error;

use crate::validator::Dimension;

#[derive(Debug, Clone, Error)]
pub enum ScreenshotError {
    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("{dimension} must be between 100 and 4000 pixels")]
    InvalidDimensions { dimension: Dimension, value: String },

    #[error("Quality must be between 1 and 100")]
    InvalidQuality(String),

    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Image encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Screenshot did not complete within {0:?}")]
    OverallTimeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ScreenshotError {
    /// Caller input errors. These are detected before any browser work starts.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScreenshotError::MissingParameter(_)
                | ScreenshotError::InvalidUrl(_)
                | ScreenshotError::InvalidDimensions { .. }
                | ScreenshotError::InvalidQuality(_)
                | ScreenshotError::InvalidBody(_)
        )
    }

    /// Stable snake_case identifier used in JSON error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenshotError::MissingParameter(_) => "missing_parameter",
            ScreenshotError::InvalidUrl(_) => "invalid_url",
            ScreenshotError::InvalidDimensions { .. } => "invalid_dimensions",
            ScreenshotError::InvalidQuality(_) => "invalid_quality",
            ScreenshotError::InvalidBody(_) => "invalid_body",
            ScreenshotError::BrowserLaunchFailed(_) => "browser_launch_error",
            ScreenshotError::NavigationTimeout(_) => "navigation_timeout",
            ScreenshotError::NavigationFailed(_) => "navigation_error",
            ScreenshotError::CaptureFailed(_) => "capture_error",
            ScreenshotError::EncodingFailed(_) => "encoding_error",
            ScreenshotError::OverallTimeout(_) => "overall_timeout",
            ScreenshotError::Configuration(_) => "configuration_error",
            ScreenshotError::Io(_) => "io_error",
            ScreenshotError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<std::io::Error> for ScreenshotError {
    fn from(err: std::io::Error) -> Self {
        ScreenshotError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ScreenshotError {
    fn from(err: serde_json::Error) -> Self {
        ScreenshotError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for ScreenshotError {
    fn from(err: image::ImageError) -> Self {
        ScreenshotError::EncodingFailed(err.to_string())
    }
}
