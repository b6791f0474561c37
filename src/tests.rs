#[cfg(test)]
mod integration_tests {
    use crate::{
        get_chrome_args, validate, CaptureDefaults, CaptureRegion, Config, OutputFormat, ParamValue,
        RawCaptureParams, ScreenshotBody, ScreenshotError, Viewport, WaitPolicy,
    };
    use std::collections::HashMap;
    use std::time::Duration;

    fn query(pairs: &[(&str, &str)]) -> RawCaptureParams {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawCaptureParams::from_query(&map)
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.viewport, Viewport { width: 1200, height: 800 });
        assert_eq!(config.default_quality, 80);
        assert_eq!(config.navigation_timeout, Duration::from_secs(30));
        assert!(config.capture_deadline > config.navigation_timeout);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(15 * 60));
        assert!(matches!(config.output_format, OutputFormat::Jpeg));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_feeds_request_defaults() {
        let config = Config {
            viewport: Viewport { width: 1024, height: 768 },
            default_quality: 65,
            navigation_timeout: Duration::from_secs(10),
            capture_deadline: Duration::from_secs(20),
            ..Default::default()
        };

        let request = validate(query(&[("url", "https://example.com")]), &CaptureDefaults::from(&config)).unwrap();

        assert_eq!(request.viewport, config.viewport);
        assert_eq!(request.quality, 65);
        assert_eq!(request.navigation_timeout, Duration::from_secs(10));
        assert_eq!(request.overall_timeout, Duration::from_secs(20));
        assert_eq!(request.wait_policy, WaitPolicy::NetworkIdle);
    }

    #[test]
    fn test_query_to_clipped_region() {
        let request = validate(
            query(&[("url", "https://example.com"), ("width", "800"), ("height", "600")]),
            &CaptureDefaults::default(),
        )
        .unwrap();

        assert_eq!(request.region(), CaptureRegion::Viewport { width: 800, height: 600 });
    }

    #[test]
    fn test_query_full_page_region() {
        let request = validate(
            query(&[("url", "https://example.com"), ("fullPage", "true"), ("waitUntil", "load")]),
            &CaptureDefaults::default(),
        )
        .unwrap();

        assert_eq!(request.region(), CaptureRegion::FullPage);
        assert_eq!(request.wait_policy, WaitPolicy::Load);
    }

    #[test]
    fn test_json_body_matches_query() {
        let body: ScreenshotBody = serde_json::from_str(
            r#"{"url": "https://example.com", "options": {"width": 800, "height": 600, "quality": 50, "fullPage": false}}"#,
        )
        .unwrap();
        let from_body = validate(body.into(), &CaptureDefaults::default()).unwrap();

        let from_query = validate(
            query(&[
                ("url", "https://example.com"),
                ("width", "800"),
                ("height", "600"),
                ("quality", "50"),
                ("fullPage", "false"),
            ]),
            &CaptureDefaults::default(),
        )
        .unwrap();

        assert_eq!(from_body.url, from_query.url);
        assert_eq!(from_body.viewport, from_query.viewport);
        assert_eq!(from_body.quality, from_query.quality);
        assert_eq!(from_body.region(), from_query.region());
        assert_ne!(from_body.id, from_query.id);
    }

    #[test]
    fn test_width_checked_before_quality() {
        let err = validate(
            query(&[("url", "https://example.com"), ("width", "5000"), ("height", "5000"), ("quality", "0")]),
            &CaptureDefaults::default(),
        )
        .unwrap_err();

        assert!(matches!(err, ScreenshotError::InvalidDimensions { .. }));
        assert_eq!(err.to_string(), "Width must be between 100 and 4000 pixels");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_non_string_url_rejected() {
        let raw = RawCaptureParams {
            url: Some(ParamValue::Int(42)),
            ..Default::default()
        };
        let err = validate(raw, &CaptureDefaults::default()).unwrap_err();
        assert_eq!(err.kind(), "invalid_url");
    }

    #[test]
    fn test_chrome_args_follow_request_viewport() {
        let config = Config::default();
        let args = get_chrome_args(&config, Viewport { width: 800, height: 600 });

        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--window-size=800,600".to_string()));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert!("gif".parse::<OutputFormat>().is_err());
    }
}
