//! Request-scoped browser sessions
//!
//! Every capture gets a fresh Chrome process, an isolated browser context and
//! a single page. Nothing is pooled or reused; the session is torn down when
//! the request finishes, whichever way it finishes.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventDomContentEventFired, EventLoadEventFired, NavigateParams,
    Viewport as ClipRect,
};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::config::{create_browser_config, CaptureRegion, Config, Viewport, WaitPolicy};
use crate::encoder::RawBitmap;
use crate::ScreenshotError;

/// How long the network must stay quiet before the page counts as idle
pub const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// How long a closing browser gets to exit before it is killed
const BROWSER_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Starts browser sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a fresh browser with one page sized to `viewport`.
    async fn acquire(&self, viewport: Viewport) -> Result<Box<dyn CaptureSession>, ScreenshotError>;
}

/// One browser, one context, one page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptureSession: Send {
    /// Navigate to `url` and wait until `policy` is satisfied or `timeout` elapses.
    async fn navigate(&mut self, url: &Url, policy: WaitPolicy, timeout: Duration) -> Result<(), ScreenshotError>;

    /// Capture `region` as lossless PNG.
    async fn capture(&mut self, region: CaptureRegion) -> Result<RawBitmap, ScreenshotError>;

    /// Tear everything down. Idempotent and infallible; problems are logged.
    async fn release(&mut self);
}

/// Scope guard that guarantees a session is released exactly once.
///
/// The normal path calls [`SessionGuard::release`]. If the guard is dropped
/// while still holding a session (the owning future was cancelled), the
/// release is detached onto the runtime so the caller is not held up.
pub struct SessionGuard {
    session: Option<Box<dyn CaptureSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn CaptureSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub async fn navigate(&mut self, url: &Url, policy: WaitPolicy, timeout: Duration) -> Result<(), ScreenshotError> {
        self.session_mut()?.navigate(url, policy, timeout).await
    }

    pub async fn capture(&mut self, region: CaptureRegion) -> Result<RawBitmap, ScreenshotError> {
        self.session_mut()?.capture(region).await
    }

    pub async fn release(mut self) {
        if let Some(mut session) = self.session.take() {
            session.release().await;
        }
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn CaptureSession>, ScreenshotError> {
        self.session
            .as_mut()
            .ok_or_else(|| ScreenshotError::CaptureFailed("browser session already released".to_string()))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Releasing abandoned browser session in the background");
                handle.spawn(async move {
                    session.release().await;
                });
            }
            Err(_) => warn!("No async runtime available; browser session dropped without release"),
        }
    }
}

/// Network activity reduced to what idle detection needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkActivity {
    Started(String),
    Finished(String),
}

/// Resolve once no request has been in flight for `quiet`.
///
/// The timer restarts every time the in-flight set becomes empty. If the
/// stream ends while requests are still outstanding the page went away, which
/// is reported as a navigation failure.
pub async fn wait_for_network_idle<S>(mut activity: S, quiet: Duration) -> Result<(), ScreenshotError>
where
    S: Stream<Item = NetworkActivity> + Unpin,
{
    let mut in_flight: HashSet<String> = HashSet::new();

    loop {
        let next = if in_flight.is_empty() {
            match tokio::time::timeout(quiet, activity.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(()),
            }
        } else {
            activity.next().await
        };

        match next {
            Some(NetworkActivity::Started(id)) => {
                in_flight.insert(id);
            }
            Some(NetworkActivity::Finished(id)) => {
                in_flight.remove(&id);
            }
            None if in_flight.is_empty() => return Ok(()),
            None => {
                return Err(ScreenshotError::NavigationFailed(format!(
                    "page closed with {} requests in flight",
                    in_flight.len()
                )))
            }
        }
    }
}

/// Launches a dedicated headless Chrome per capture
pub struct ChromeLauncher {
    config: Config,
}

impl ChromeLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn acquire(&self, viewport: Viewport) -> Result<Box<dyn CaptureSession>, ScreenshotError> {
        let user_data_dir = UserDataDir::create().await?;
        let browser_config = create_browser_config(&self.config, viewport, user_data_dir.path())?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScreenshotError::BrowserLaunchFailed(e.to_string()))?;

        // The handler stream drives all DevTools traffic and must be polled
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            debug!("Browser handler finished");
        });

        let mut session = ChromeSession {
            browser: Some(browser),
            handler: Some(handler_task),
            context_id: None,
            page: None,
            user_data_dir: Some(user_data_dir),
        };

        if let Err(e) = session.open_page(viewport).await {
            session.release().await;
            return Err(e);
        }

        debug!("Browser session ready ({}x{})", viewport.width, viewport.height);
        Ok(Box::new(session))
    }
}

/// Throw-away Chrome profile directory, removed on drop
struct UserDataDir {
    path: PathBuf,
    removed: bool,
}

impl UserDataDir {
    async fn create() -> Result<Self, ScreenshotError> {
        let path = std::env::temp_dir().join(format!("snapshot-service-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ScreenshotError::BrowserLaunchFailed(format!("Failed to create user data dir: {e}")))?;
        Ok(Self { path, removed: false })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory on the current thread. Blocks while retrying.
    fn remove_blocking(mut self) {
        remove_dir_with_retry(&self.path);
        self.removed = true;
    }
}

impl Drop for UserDataDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        // Chrome may still be exiting after a cancelled launch
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_dir_with_retry(&path));
            }
            Err(_) => remove_dir_with_retry(&path),
        }
    }
}

const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(200);

fn remove_dir_with_retry(path: &Path) {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match std::fs::remove_dir_all(path) {
            Ok(()) => return,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) if attempt == REMOVE_ATTEMPTS => {
                warn!("Failed to remove {} after {} attempts: {}", path.display(), attempt, e);
            }
            Err(e) => {
                debug!("Retrying removal of {}: {}", path.display(), e);
                std::thread::sleep(REMOVE_RETRY_DELAY);
            }
        }
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
    user_data_dir: Option<UserDataDir>,
}

impl ChromeSession {
    async fn open_page(&mut self, viewport: Viewport) -> Result<(), ScreenshotError> {
        let launch_failed = |e: String| ScreenshotError::BrowserLaunchFailed(e);

        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| launch_failed("browser already closed".to_string()))?;

        let context_id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| launch_failed(e.to_string()))?;
        self.context_id = Some(context_id.clone());

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(launch_failed)?;

        let page = browser.new_page(target).await.map_err(|e| launch_failed(e.to_string()))?;

        let emulation = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width)
            .height(viewport.height)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(launch_failed)?;

        page.execute(emulation).await.map_err(|e| launch_failed(e.to_string()))?;

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page, ScreenshotError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScreenshotError::CaptureFailed("page already closed".to_string()))
    }

    async fn navigate_and_wait(&self, url: &Url, policy: WaitPolicy) -> Result<(), ScreenshotError> {
        let page = self.page()?;
        let failed = |e: chromiumoxide::error::CdpError| ScreenshotError::NavigationFailed(e.to_string());

        // Subscribe before navigating so no event can slip past
        let mut load_events = page.event_listener::<EventLoadEventFired>().await.map_err(failed)?;
        let mut dom_events = page.event_listener::<EventDomContentEventFired>().await.map_err(failed)?;

        let network = if policy == WaitPolicy::NetworkIdle {
            page.execute(EnableParams::default()).await.map_err(failed)?;
            let started = page
                .event_listener::<EventRequestWillBeSent>()
                .await
                .map_err(failed)?
                .map(|event| NetworkActivity::Started(event.request_id.inner().clone()));
            let finished = page
                .event_listener::<EventLoadingFinished>()
                .await
                .map_err(failed)?
                .map(|event| NetworkActivity::Finished(event.request_id.inner().clone()));
            let failed_requests = page
                .event_listener::<EventLoadingFailed>()
                .await
                .map_err(failed)?
                .map(|event| NetworkActivity::Finished(event.request_id.inner().clone()));
            Some(Box::pin(futures::stream::select(
                started,
                futures::stream::select(finished, failed_requests),
            )))
        } else {
            None
        };

        let response = page.execute(NavigateParams::new(url.as_str())).await.map_err(failed)?;
        if let Some(error_text) = &response.result.error_text {
            return Err(ScreenshotError::NavigationFailed(format!("{url}: {error_text}")));
        }
        debug!("Navigation committed, waiting for {}", policy.as_str());

        let closed = || ScreenshotError::NavigationFailed("page closed before it finished loading".to_string());
        match policy {
            WaitPolicy::DomContentLoaded => {
                dom_events.next().await.ok_or_else(closed)?;
            }
            WaitPolicy::Load => {
                load_events.next().await.ok_or_else(closed)?;
            }
            WaitPolicy::NetworkIdle => {
                load_events.next().await.ok_or_else(closed)?;
                if let Some(activity) = network {
                    wait_for_network_idle(activity, NETWORK_QUIET_WINDOW).await?;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CaptureSession for ChromeSession {
    async fn navigate(&mut self, url: &Url, policy: WaitPolicy, timeout: Duration) -> Result<(), ScreenshotError> {
        match tokio::time::timeout(timeout, self.navigate_and_wait(url, policy)).await {
            Ok(result) => result,
            Err(_) => Err(ScreenshotError::NavigationTimeout(timeout)),
        }
    }

    async fn capture(&mut self, region: CaptureRegion) -> Result<RawBitmap, ScreenshotError> {
        let builder = ScreenshotParams::builder().format(CaptureScreenshotFormat::Png);

        let params = match region {
            CaptureRegion::Viewport { width, height } => builder
                .clip(ClipRect {
                    x: 0.0,
                    y: 0.0,
                    width: width as f64,
                    height: height as f64,
                    scale: 1.0,
                })
                .build(),
            CaptureRegion::FullPage => builder.full_page(true).build(),
        };

        let png = self
            .page()?
            .screenshot(params)
            .await
            .map_err(|e| ScreenshotError::CaptureFailed(e.to_string()))?;

        debug!("Captured {} bytes of PNG", png.len());
        Ok(RawBitmap(png))
    }

    async fn release(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }

        if let (Some(browser), Some(context_id)) = (self.browser.as_ref(), self.context_id.take()) {
            if let Err(e) = browser.dispose_browser_context(context_id).await {
                warn!("Failed to dispose browser context: {}", e);
            }
        }

        if let Some(mut browser) = self.browser.take() {
            let exited = tokio::time::timeout(BROWSER_EXIT_GRACE, async {
                if let Err(e) = browser.close().await {
                    debug!("Browser close command failed: {}", e);
                }
                browser.wait().await
            })
            .await;

            match exited {
                Ok(Ok(_)) => debug!("Browser exited"),
                Ok(Err(e)) => warn!("Failed waiting for browser exit: {}", e),
                Err(_) => {
                    warn!("Browser did not exit within {:?}, killing it", BROWSER_EXIT_GRACE);
                    if let Some(Err(e)) = browser.kill().await {
                        warn!("Failed to kill browser: {}", e);
                    }
                }
            }
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || dir.remove_blocking()).await {
                warn!("User data dir cleanup task failed: {}", e);
            }
        }
    }
}
