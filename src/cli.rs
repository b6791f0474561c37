use crate::server::{self, AppState};
use crate::utils::{format_bytes, output_filename};
use crate::{
    validate, CaptureDefaults, Config, OutputFormat, ParamValue, RawCaptureParams, RateLimiter,
    ScreenshotService,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snapshot-service")]
#[command(about = "Render web pages to images over HTTP")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, env = "SNAPSHOT_CONFIG", help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, env = "SNAPSHOT_CHROME_PATH", help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, env = "SNAPSHOT_OUTPUT_FORMAT", help = "Output format (jpeg, webp, png)")]
    pub format: Option<OutputFormat>,

    #[arg(long, env = "SNAPSHOT_USER_AGENT", help = "User-Agent sent by the browser")]
    pub user_agent: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP screenshot server
    Serve {
        #[arg(long, env = "SNAPSHOT_HOST", help = "Bind address")]
        host: Option<String>,

        #[arg(short, long, env = "SNAPSHOT_PORT", help = "Server port")]
        port: Option<u16>,

        #[arg(long, env = "SNAPSHOT_RATE_LIMIT_MAX", help = "Requests per client per window")]
        rate_limit_max: Option<u32>,

        #[arg(long, env = "SNAPSHOT_RATE_LIMIT_WINDOW_SECS", help = "Rate limit window in seconds")]
        rate_limit_window_secs: Option<u64>,

        #[arg(
            long = "cors-origin",
            env = "SNAPSHOT_CORS_ORIGINS",
            value_delimiter = ',',
            help = "Allowed CORS origin (repeatable; default any)"
        )]
        cors_origins: Vec<String>,

        #[arg(long, env = "SNAPSHOT_DEVELOPMENT", help = "Include error details in responses")]
        development: bool,

        #[arg(
            long,
            env = "SNAPSHOT_TRUST_PROXY",
            help = "Rate limit on the X-Forwarded-For hop added by a reverse proxy"
        )]
        trust_proxy: bool,
    },

    /// Take a single screenshot and write it to disk
    Capture {
        #[arg(short, long, help = "URL to screenshot")]
        url: String,

        #[arg(short, long, help = "Output file path (default derived from the URL)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Viewport width")]
        width: Option<u32>,

        #[arg(long, help = "Viewport height")]
        height: Option<u32>,

        #[arg(long, help = "Output quality (1-100)")]
        quality: Option<u8>,

        #[arg(long, help = "Capture the full scrollable page")]
        full_page: bool,

        #[arg(long, help = "load, domcontentloaded or networkidle")]
        wait_until: Option<String>,

        #[arg(long, help = "Navigation timeout in milliseconds")]
        timeout: Option<u64>,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Serve {
                host,
                port,
                rate_limit_max,
                rate_limit_window_secs,
                cors_origins,
                development,
                trust_proxy,
            } => {
                let mut config = self.config;
                if let Some(host) = host {
                    config.host = host;
                }
                if let Some(port) = port {
                    config.port = port;
                }
                if let Some(max) = rate_limit_max {
                    config.rate_limit.max_requests = max;
                }
                if let Some(secs) = rate_limit_window_secs {
                    config.rate_limit.window = Duration::from_secs(secs);
                }
                if !cors_origins.is_empty() {
                    config.cors_origins = Some(cors_origins);
                }
                if development {
                    config.environment = crate::Environment::Development;
                }
                if trust_proxy {
                    config.rate_limit.trust_proxy = true;
                }
                config.validate()?;
                run_server(config).await
            }
            Commands::Capture {
                url,
                output,
                width,
                height,
                quality,
                full_page,
                wait_until,
                timeout,
            } => {
                let raw = RawCaptureParams {
                    url: Some(ParamValue::Text(url)),
                    width: width.map(|w| ParamValue::Int(w.into())),
                    height: height.map(|h| ParamValue::Int(h.into())),
                    quality: quality.map(|q| ParamValue::Int(q.into())),
                    full_page: Some(ParamValue::Bool(full_page)),
                    wait_until: wait_until.map(ParamValue::Text),
                    timeout: timeout.map(|ms| ParamValue::Int(ms.min(i64::MAX as u64) as i64)),
                };
                self.run_capture(raw, output).await
            }
            Commands::Validate { config } => validate_config(config).await,
        }
    }

    async fn run_capture(&self, raw: RawCaptureParams, output: Option<PathBuf>) -> anyhow::Result<()> {
        let request = validate(raw, &CaptureDefaults::from(&self.config))?;
        info!("Taking screenshot of: {}", request.url);

        let output = output
            .unwrap_or_else(|| PathBuf::from(output_filename(&request.url, self.config.output_format)));

        let service = ScreenshotService::new(self.config.clone());
        let result = service.capture(request).await?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&output, &result.image.bytes)
            .await
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!("Screenshot saved to: {}", output.display());

        println!("Screenshot captured successfully:");
        println!("  URL: {}", result.url);
        println!("  Output: {}", output.display());
        println!("  Format: {:?}", result.image.format);
        println!("  Dimensions: {}x{}", result.image.width, result.image.height);
        println!("  Size: {}", format_bytes(result.image.bytes.len()));
        println!("  Duration: {:?}", result.duration);

        Ok(())
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let metrics = crate::metrics::install_recorder()?;

    let service = ScreenshotService::new(config.clone());
    let state = AppState::new(service, &config).with_metrics(metrics);
    let limiter = RateLimiter::new(&config.rate_limit);

    info!(
        "Serving {:?} screenshots, default viewport {}x{}, {} requests per {:?} per client",
        config.output_format,
        config.viewport.width,
        config.viewport.height,
        config.rate_limit.max_requests,
        config.rate_limit.window
    );

    server::serve(
        &config.bind_address(),
        state,
        limiter,
        config.cors_origins.as_deref(),
        shutdown_signal(),
    )
    .await?;

    info!("Server stopped");
    Ok(())
}

pub async fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = read_config(&config_path).await?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Listen: {}", config.bind_address());
    println!("  Output format: {:?}", config.output_format);
    println!("  Viewport: {}x{}", config.viewport.width, config.viewport.height);
    println!("  Default quality: {}", config.default_quality);
    println!("  Navigation timeout: {:?}", config.navigation_timeout);
    println!("  Capture deadline: {:?}", config.capture_deadline);
    println!(
        "  Rate limit: {} per {:?}",
        config.rate_limit.max_requests, config.rate_limit.window
    );
    println!("  Trust proxy: {}", config.rate_limit.trust_proxy);

    Ok(())
}

async fn read_config(path: &PathBuf) -> anyhow::Result<Config> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = serde_json::from_str(&content).with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Load the configuration file (or defaults) and apply global overrides.
pub async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => read_config(path).await?,
        None => Config::default(),
    };

    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }
    if let Some(format) = args.format {
        config.output_format = format;
    }
    if let Some(user_agent) = &args.user_agent {
        config.user_agent = Some(user_agent.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` selects debug.
pub fn setup_logging(verbose: bool) {
    let default_directive = if verbose {
        "debug,tower_http=debug,chromiumoxide=info"
    } else {
        "info,chromiumoxide=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_capture() {
        let cli = Cli::try_parse_from([
            "snapshot-service",
            "--format",
            "png",
            "capture",
            "--url",
            "https://example.com",
            "--width",
            "800",
            "--full-page",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Png));
        match cli.command {
            Commands::Capture { url, width, full_page, .. } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(width, Some(800));
                assert!(full_page);
            }
            _ => panic!("expected capture"),
        }
    }

    #[test]
    fn test_parse_serve_cors_list() {
        let cli = Cli::try_parse_from([
            "snapshot-service",
            "serve",
            "--port",
            "8080",
            "--cors-origin",
            "https://a.example,https://b.example",
        ])
        .unwrap();

        match cli.command {
            Commands::Serve { port, cors_origins, .. } => {
                assert_eq!(port, Some(8080));
                assert_eq!(cors_origins, vec!["https://a.example", "https://b.example"]);
            }
            _ => panic!("expected serve"),
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("snapshot-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"port": 9000, "default_quality": 70}"#).unwrap();

        let cli = Cli::try_parse_from([
            "snapshot-service",
            "--config",
            path.to_str().unwrap(),
            "--format",
            "webp",
            "validate",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let config = load_config(&cli).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.default_quality, 70);
        assert_eq!(config.output_format, OutputFormat::Webp);
    }
}
