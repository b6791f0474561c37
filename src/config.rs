//! Configuration management with serde serialization/deserialization
//!
//! This module provides the service configuration, the per-request capture
//! structures produced by the validator, and the Chrome launch settings derived
//! from them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::ScreenshotError;

/// Main configuration structure for the screenshot service
///
/// Loaded from a JSON file when `--config` is given, otherwise built from
/// defaults. Command-line flags and `SNAPSHOT_*` environment variables are
/// applied on top.
///
/// # Examples
///
/// ```rust
/// use snapshot_service::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     port: 8080,
///     default_quality: 90,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to (default: 0.0.0.0)
    pub host: String,

    /// Port the HTTP server listens on (default: 3000)
    pub port: u16,

    /// Viewport used when a request omits width or height (default: 1200x800)
    pub viewport: Viewport,

    /// Output quality used when a request omits it (default: 80)
    pub default_quality: u8,

    /// Output image format for screenshots (default: JPEG)
    pub output_format: OutputFormat,

    /// Navigation timeout used when a request omits it (default: 30 seconds)
    pub navigation_timeout: Duration,

    /// Hard ceiling for a whole capture, launch to encoded bytes (default: 60 seconds)
    ///
    /// Independent of, and larger than, the navigation timeout.
    pub capture_deadline: Duration,

    /// Per-client request limits for the screenshot endpoint
    pub rate_limit: RateLimitSettings,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for page loads (default: Chrome default)
    pub user_agent: Option<String>,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// `Cache-Control` max-age for successful screenshot responses, in seconds
    pub cache_max_age: u32,

    /// Deployment environment; development mode adds error details to responses
    pub environment: Environment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            viewport: Viewport::default(),
            default_quality: 80,
            output_format: OutputFormat::Jpeg,
            navigation_timeout: Duration::from_secs(30),
            capture_deadline: Duration::from_secs(60),
            rate_limit: RateLimitSettings::default(),
            chrome_path: None,
            user_agent: None,
            cors_origins: None,
            cache_max_age: 3600,
            environment: Environment::Production,
        }
    }
}

impl Config {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ScreenshotError> {
        if self.port == 0 {
            return Err(ScreenshotError::Configuration(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.navigation_timeout.is_zero() || self.capture_deadline.is_zero() {
            return Err(ScreenshotError::Configuration(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.capture_deadline <= self.navigation_timeout {
            return Err(ScreenshotError::Configuration(format!(
                "Capture deadline ({:?}) must be longer than the navigation timeout ({:?})",
                self.capture_deadline, self.navigation_timeout
            )));
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window.is_zero() {
            return Err(ScreenshotError::Configuration(
                "Rate limit window and ceiling must be greater than 0".to_string(),
            ));
        }

        if let Some(origins) = &self.cors_origins {
            if let Some(bad) = origins.iter().find(|origin| !is_valid_origin(origin)) {
                return Err(ScreenshotError::Configuration(format!(
                    "Invalid CORS origin '{bad}' (expected scheme://host[:port])"
                )));
            }
        }

        let dimensions = crate::MIN_DIMENSION..=crate::MAX_DIMENSION;
        if !dimensions.contains(&self.viewport.width) || !dimensions.contains(&self.viewport.height) {
            return Err(ScreenshotError::Configuration(format!(
                "Default viewport must be between {} and {} pixels",
                crate::MIN_DIMENSION,
                crate::MAX_DIMENSION
            )));
        }

        if !(crate::MIN_QUALITY..=crate::MAX_QUALITY).contains(&self.default_quality) {
            return Err(ScreenshotError::Configuration(
                "Default quality must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment, Environment::Development)
    }
}

/// `origin` is exactly `http(s)://host[:port]`, as browsers send it.
pub fn is_valid_origin(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some()
                && url.origin().ascii_serialization() == origin
        }
        Err(_) => false,
    }
}

/// Browser viewport configuration for screenshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1200)
    pub width: u32,

    /// Viewport height in pixels (default: 800)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Fixed-window rate limit applied per client address
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Length of one counting window (default: 15 minutes)
    pub window: Duration,

    /// Requests allowed per client per window (default: 100)
    pub max_requests: u32,

    /// Key clients on the hop our reverse proxy appends to `X-Forwarded-For`
    /// instead of the socket peer (default: false)
    ///
    /// Only enable this when every request arrives through that proxy.
    pub trust_proxy: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Supported output image formats for screenshots
///
/// Each format has different characteristics:
/// - JPEG: Lossy compression tuned by the request quality
/// - WebP: Lossless WebP, usually smaller than PNG for page captures
/// - PNG: Lossless compression, largest files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG format - lossy compression, quality-tunable
    #[default]
    Jpeg,
    /// WebP format - lossless encoder
    Webp,
    /// PNG format - lossless compression
    Png,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ScreenshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            "png" => Ok(OutputFormat::Png),
            other => Err(ScreenshotError::Configuration(format!(
                "Unknown output format: {other} (expected jpeg, webp or png)"
            ))),
        }
    }
}

/// When navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitPolicy {
    /// Page `load` event
    Load,
    /// `DOMContentLoaded` only
    DomContentLoaded,
    /// Load event, then no request in flight for the quiescence window
    #[default]
    NetworkIdle,
}

impl WaitPolicy {
    /// Parse a `waitUntil` value. Unknown values fall back to network-idle.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "load" => WaitPolicy::Load,
            "domcontentloaded" => WaitPolicy::DomContentLoaded,
            _ => WaitPolicy::NetworkIdle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitPolicy::Load => "load",
            WaitPolicy::DomContentLoaded => "domcontentloaded",
            WaitPolicy::NetworkIdle => "network-idle",
        }
    }
}

/// Area of the page that ends up in the bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRegion {
    /// Exactly `(0, 0, width, height)`, regardless of what renders outside it
    Viewport { width: u32, height: u32 },
    /// The full scrollable document
    FullPage,
}

/// One validated screenshot request
///
/// Built by [`crate::validate`] and consumed once by the orchestrator.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub id: String,
    pub url: Url,
    pub viewport: Viewport,
    pub quality: u8,
    pub full_page: bool,
    pub wait_policy: WaitPolicy,
    pub navigation_timeout: Duration,
    pub overall_timeout: Duration,
}

impl CaptureRequest {
    /// A request for `url` with every option at its default.
    pub fn new(url: Url) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            viewport: Viewport::default(),
            quality: 80,
            full_page: false,
            wait_policy: WaitPolicy::default(),
            navigation_timeout: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(60),
        }
    }

    pub fn region(&self) -> CaptureRegion {
        if self.full_page {
            CaptureRegion::FullPage
        } else {
            CaptureRegion::Viewport {
                width: self.viewport.width,
                height: self.viewport.height,
            }
        }
    }
}

/// Generate Chrome command-line arguments for one capture session
///
/// # Examples
///
/// ```rust
/// use snapshot_service::{Config, Viewport, get_chrome_args};
///
/// let config = Config::default();
/// let args = get_chrome_args(&config, Viewport::default());
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(config: &Config, viewport: Viewport) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--window-size={},{}", viewport.width, viewport.height),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

/// Every session gets its own user data directory so concurrent browsers never
/// share a profile or trip Chrome's process-singleton lock.
pub fn create_browser_config(
    config: &Config,
    viewport: Viewport,
    user_data_dir: &Path,
) -> Result<chromiumoxide::browser::BrowserConfig, ScreenshotError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(viewport.width, viewport.height)
        .user_data_dir(user_data_dir)
        .args(get_chrome_args(config, viewport));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ScreenshotError::BrowserLaunchFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validate_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_rejects_bad_values() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            viewport: Viewport {
                width: 50,
                height: 800,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            rate_limit: RateLimitSettings {
                window: Duration::from_secs(60),
                max_requests: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deadline_must_exceed_navigation_timeout() {
        let config = Config {
            navigation_timeout: Duration::from_secs(30),
            capture_deadline: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ScreenshotError::Configuration(_))));

        let config = Config {
            navigation_timeout: Duration::from_secs(30),
            capture_deadline: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            navigation_timeout: Duration::from_secs(30),
            capture_deadline: Duration::from_secs(45),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cors_origins_validated() {
        let config = Config {
            cors_origins: Some(vec!["https://app.example.com".to_string(), "http://localhost:8080".to_string()]),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        for bad in ["https//app.example.com", "app.example.com", "https://app.example.com/", "ftp://example.com"] {
            let config = Config {
                cors_origins: Some(vec!["https://ok.example.com".to_string(), bad.to_string()]),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_config_partial_json() {
        let config: Config = serde_json::from_str(r#"{"port": 8080, "output_format": "webp"}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.output_format, OutputFormat::Webp);
        assert_eq!(config.viewport, Viewport::default());
        assert_eq!(config.default_quality, 80);
    }

    #[test]
    fn test_wait_policy_aliases() {
        assert_eq!(WaitPolicy::parse_lenient("load"), WaitPolicy::Load);
        assert_eq!(WaitPolicy::parse_lenient("DOMContentLoaded"), WaitPolicy::DomContentLoaded);
        assert_eq!(WaitPolicy::parse_lenient("networkidle0"), WaitPolicy::NetworkIdle);
        assert_eq!(WaitPolicy::parse_lenient("networkidle2"), WaitPolicy::NetworkIdle);
        assert_eq!(WaitPolicy::parse_lenient("whenever"), WaitPolicy::NetworkIdle);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert!("gif".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Webp.mime_type(), "image/webp");
    }

    #[test]
    fn test_capture_region() {
        let mut request = CaptureRequest::new(Url::parse("https://example.com").unwrap());
        request.viewport = Viewport {
            width: 800,
            height: 600,
        };
        assert_eq!(
            request.region(),
            CaptureRegion::Viewport {
                width: 800,
                height: 600
            }
        );

        request.full_page = true;
        assert_eq!(request.region(), CaptureRegion::FullPage);
    }

    #[test]
    fn test_chrome_args() {
        let config = Config {
            user_agent: Some("SnapshotBot/1.0".to_string()),
            ..Default::default()
        };
        let viewport = Viewport {
            width: 800,
            height: 600,
        };
        let args = get_chrome_args(&config, viewport);

        assert!(args.contains(&"--window-size=800,600".to_string()));
        assert!(args.contains(&"--user-agent=SnapshotBot/1.0".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--remote-debugging-port")));
    }
}
