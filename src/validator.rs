//! Request parameter validation
//!
//! Turns loosely typed query-string or JSON input into one canonical
//! [`CaptureRequest`]. Validation is pure: nothing here touches the browser.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::config::{CaptureRequest, Config, Viewport, WaitPolicy};
use crate::ScreenshotError;

pub const MIN_DIMENSION: u32 = 100;
pub const MAX_DIMENSION: u32 = 4000;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;
pub const MIN_NAVIGATION_TIMEOUT_MS: u64 = 1_000;
pub const MAX_NAVIGATION_TIMEOUT_MS: u64 = 60_000;
/// Time reserved inside the overall deadline for launch, capture and encode
pub const DEADLINE_HEADROOM_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Width,
    Height,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Width => write!(f, "Width"),
            Dimension::Height => write!(f, "Height"),
        }
    }
}

/// A scalar as it arrives from a query string or a JSON body
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            ParamValue::Float(value) if value.fract() == 0.0 && value.is_finite() => Some(*value as i64),
            ParamValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_flag(&self) -> bool {
        match self {
            ParamValue::Bool(value) => *value,
            ParamValue::Int(value) => *value == 1,
            ParamValue::Text(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            ParamValue::Float(_) => false,
        }
    }

    fn raw(&self) -> String {
        match self {
            ParamValue::Bool(value) => value.to_string(),
            ParamValue::Int(value) => value.to_string(),
            ParamValue::Float(value) => value.to_string(),
            ParamValue::Text(text) => text.clone(),
        }
    }
}

/// Unvalidated capture parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCaptureParams {
    pub url: Option<ParamValue>,
    pub width: Option<ParamValue>,
    pub height: Option<ParamValue>,
    pub quality: Option<ParamValue>,
    pub full_page: Option<ParamValue>,
    pub wait_until: Option<ParamValue>,
    pub timeout: Option<ParamValue>,
}

impl RawCaptureParams {
    /// Collect parameters from a decoded query string. Empty values count as absent.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            query
                .get(key)
                .filter(|value| !value.is_empty())
                .map(|value| ParamValue::Text(value.clone()))
        };

        Self {
            url: get("url"),
            width: get("width"),
            height: get("height"),
            quality: get("quality"),
            full_page: get("fullPage"),
            wait_until: get("waitUntil"),
            timeout: get("timeout"),
        }
    }
}

/// JSON body accepted by `POST /screenshot`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScreenshotBody {
    pub url: Option<ParamValue>,
    /// Absent and `null` both mean every option at its default
    #[serde(default)]
    pub options: Option<CaptureOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    pub width: Option<ParamValue>,
    pub height: Option<ParamValue>,
    pub quality: Option<ParamValue>,
    pub full_page: Option<ParamValue>,
    pub wait_until: Option<ParamValue>,
    pub timeout: Option<ParamValue>,
}

impl From<ScreenshotBody> for RawCaptureParams {
    fn from(body: ScreenshotBody) -> Self {
        let options = body.options.unwrap_or_default();
        Self {
            url: body.url,
            width: options.width,
            height: options.height,
            quality: options.quality,
            full_page: options.full_page,
            wait_until: options.wait_until,
            timeout: options.timeout,
        }
    }
}

/// Values used for every option a request leaves out
#[derive(Debug, Clone)]
pub struct CaptureDefaults {
    pub viewport: Viewport,
    pub quality: u8,
    pub navigation_timeout: Duration,
    pub overall_timeout: Duration,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CaptureDefaults {
    fn from(config: &Config) -> Self {
        Self {
            viewport: config.viewport,
            quality: config.default_quality,
            navigation_timeout: config.navigation_timeout,
            overall_timeout: config.capture_deadline,
        }
    }
}

/// Validate raw parameters into a [`CaptureRequest`].
///
/// Rules are applied in order and the first failure wins: url, width, height,
/// quality. `fullPage`, `waitUntil` and `timeout` never fail; bad values fall
/// back to their defaults.
///
/// # Examples
///
/// ```rust
/// use snapshot_service::{validate, CaptureDefaults, ParamValue, RawCaptureParams};
///
/// let raw = RawCaptureParams {
///     url: Some(ParamValue::Text("https://example.com".to_string())),
///     width: Some(ParamValue::Int(800)),
///     ..Default::default()
/// };
/// let request = validate(raw, &CaptureDefaults::default()).unwrap();
/// assert_eq!(request.viewport.width, 800);
/// ```
pub fn validate(raw: RawCaptureParams, defaults: &CaptureDefaults) -> Result<CaptureRequest, ScreenshotError> {
    let url = parse_url(raw.url.as_ref())?;

    let width = parse_dimension(raw.width.as_ref(), Dimension::Width)?.unwrap_or(defaults.viewport.width);
    let height = parse_dimension(raw.height.as_ref(), Dimension::Height)?.unwrap_or(defaults.viewport.height);

    let quality = parse_quality(raw.quality.as_ref())?.unwrap_or(defaults.quality);

    let full_page = raw.full_page.as_ref().map(ParamValue::as_flag).unwrap_or(false);

    let wait_policy = match raw.wait_until.as_ref() {
        Some(ParamValue::Text(text)) => WaitPolicy::parse_lenient(text),
        _ => WaitPolicy::default(),
    };

    let navigation_timeout = raw
        .timeout
        .as_ref()
        .and_then(ParamValue::as_integer)
        .map(|ms| {
            let ceiling = max_navigation_timeout_ms(defaults.overall_timeout);
            let ms = ms.clamp(MIN_NAVIGATION_TIMEOUT_MS as i64, ceiling as i64);
            Duration::from_millis(ms as u64)
        })
        .unwrap_or(defaults.navigation_timeout);

    Ok(CaptureRequest {
        id: uuid::Uuid::new_v4().to_string(),
        url,
        viewport: Viewport { width, height },
        quality,
        full_page,
        wait_policy,
        navigation_timeout,
        overall_timeout: defaults.overall_timeout,
    })
}

/// Largest navigation timeout a request may ask for under `overall_timeout`.
///
/// Stays strictly below the deadline so a slow page reports
/// `NavigationTimeout` rather than losing the race to `OverallTimeout`.
pub fn max_navigation_timeout_ms(overall_timeout: Duration) -> u64 {
    let overall_ms = u64::try_from(overall_timeout.as_millis()).unwrap_or(u64::MAX);
    overall_ms
        .saturating_sub(DEADLINE_HEADROOM_MS)
        .min(MAX_NAVIGATION_TIMEOUT_MS)
        .max(MIN_NAVIGATION_TIMEOUT_MS)
}

fn parse_url(value: Option<&ParamValue>) -> Result<Url, ScreenshotError> {
    let text = match value {
        None => return Err(ScreenshotError::MissingParameter("URL")),
        Some(ParamValue::Text(text)) if text.trim().is_empty() => {
            return Err(ScreenshotError::MissingParameter("URL"))
        }
        Some(ParamValue::Text(text)) => text.trim(),
        Some(other) => return Err(ScreenshotError::InvalidUrl(other.raw())),
    };

    let url = Url::parse(text).map_err(|e| ScreenshotError::InvalidUrl(format!("{text} ({e})")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ScreenshotError::InvalidUrl(format!(
            "{text} (unsupported scheme '{scheme}')"
        ))),
    }
}

fn parse_dimension(value: Option<&ParamValue>, dimension: Dimension) -> Result<Option<u32>, ScreenshotError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let invalid = || ScreenshotError::InvalidDimensions {
        dimension,
        value: value.raw(),
    };

    let number = value.as_integer().ok_or_else(invalid)?;
    if number < MIN_DIMENSION as i64 || number > MAX_DIMENSION as i64 {
        return Err(invalid());
    }

    Ok(Some(number as u32))
}

fn parse_quality(value: Option<&ParamValue>) -> Result<Option<u8>, ScreenshotError> {
    let Some(value) = value else {
        return Ok(None);
    };

    match value.as_integer() {
        Some(number) if (MIN_QUALITY as i64..=MAX_QUALITY as i64).contains(&number) => Ok(Some(number as u8)),
        _ => Err(ScreenshotError::InvalidQuality(value.raw())),
    }
}
