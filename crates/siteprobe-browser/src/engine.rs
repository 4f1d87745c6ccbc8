use crate::console::{ConsoleCapture, ConsoleLevel, ConsoleMessage};
use crate::error::{BrowserError, Result};
use crate::page::{BrowserPage, BrowserSession, NavigationResponse, SessionProvider};
use crate::viewport::ClientIdentity;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EvaluateParams, EventConsoleApiCalled,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use futures_util::FutureExt;
use siteprobe_core::BrowserConfig;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long the network must stay quiet before a page counts as settled
const NETWORK_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// The shared Chromium process and its event handler task.
struct LaunchedBrowser {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    control_port: Option<u16>,
}

impl Drop for LaunchedBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn launch(config: &BrowserConfig) -> Result<LaunchedBrowser> {
    let mut builder = ChromiumConfig::builder()
        .no_sandbox()
        .window_size(config.viewport_width, config.viewport_height);
    if !config.headless {
        builder = builder.with_head();
    }
    if let Some(executable) = &config.executable {
        builder = builder.chrome_executable(executable);
    }
    let chromium_config = builder.build().map_err(BrowserError::LaunchFailed)?;

    let (browser, mut handler) = Browser::launch(chromium_config)
        .await
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    // Spawn browser handler
    let handler = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("Browser handler event error: {}", e);
            }
        }
    });

    let control_port = url::Url::parse(browser.websocket_address())
        .ok()
        .and_then(|u| u.port());

    tracing::info!(
        "Browser launched (headless: {}, control port: {:?})",
        config.headless,
        control_port
    );

    Ok(LaunchedBrowser {
        browser: Mutex::new(browser),
        handler,
        control_port,
    })
}

/// Bounded pool of isolated sessions on one lazily-launched browser process.
///
/// At most `max_sessions` sessions are open at once; further requests wait up
/// to `acquire_timeout` for a lease to be released.
pub struct SessionPool {
    config: BrowserConfig,
    identity: ClientIdentity,
    browser: OnceCell<Arc<LaunchedBrowser>>,
    permits: Arc<Semaphore>,
}

impl SessionPool {
    pub fn new(config: BrowserConfig) -> Self {
        let identity = ClientIdentity::from_config(&config);
        let permits = Arc::new(Semaphore::new(config.max_sessions.max(1)));
        Self {
            config,
            identity,
            browser: OnceCell::new(),
            permits,
        }
    }

    /// Sessions that can be opened right now without waiting.
    pub fn available_sessions(&self) -> usize {
        self.permits.available_permits()
    }

    /// Whether the browser process has been launched.
    pub fn is_launched(&self) -> bool {
        self.browser.initialized()
    }

    async fn browser(&self) -> Result<Arc<LaunchedBrowser>> {
        self.browser
            .get_or_try_init(|| async { launch(&self.config).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Lease a session, waiting for capacity if the pool is full.
    pub async fn lease(&self) -> Result<PooledSession> {
        let wait = self.config.acquire_timeout();
        let permit = tokio::time::timeout(wait, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| BrowserError::PoolExhausted(wait))?
            .map_err(|_| BrowserError::Session("session pool closed".to_string()))?;

        let browser = self.browser().await?;

        let context_id = {
            let guard = browser.browser.lock().await;
            guard
                .execute(CreateBrowserContextParams::default())
                .await?
                .result
                .browser_context_id
                .clone()
        };

        match open_page(&browser, &context_id, &self.identity).await {
            Ok(page) => {
                tracing::debug!(
                    "Leased browser session ({} remaining)",
                    self.permits.available_permits()
                );
                Ok(PooledSession {
                    page: ChromiumPage {
                        page,
                        control_port: browser.control_port,
                    },
                    context_id,
                    browser,
                    _permit: permit,
                })
            }
            Err(e) => {
                dispose_context(&browser, context_id).await;
                Err(e)
            }
        }
    }
}

async fn open_page(
    browser: &LaunchedBrowser,
    context_id: &BrowserContextId,
    identity: &ClientIdentity,
) -> Result<Page> {
    let params = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context_id.clone())
        .build()
        .map_err(BrowserError::Session)?;

    let page = browser.browser.lock().await.new_page(params).await?;

    page.execute(SetUserAgentOverrideParams::new(identity.user_agent.clone()))
        .await?;
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(identity.viewport_width),
        i64::from(identity.viewport_height),
        1.0,
        false,
    ))
    .await?;

    Ok(page)
}

async fn dispose_context(browser: &LaunchedBrowser, context_id: BrowserContextId) {
    let guard = browser.browser.lock().await;
    if let Err(e) = guard
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        tracing::warn!("Failed to dispose browser context: {}", e);
    }
}

#[async_trait]
impl SessionProvider for SessionPool {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(self.lease().await?))
    }
}

/// A leased session. Closing it disposes the context and frees the slot.
pub struct PooledSession {
    page: ChromiumPage,
    context_id: BrowserContextId,
    browser: Arc<LaunchedBrowser>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl BrowserSession for PooledSession {
    fn page(&self) -> &dyn BrowserPage {
        &self.page
    }

    async fn close(self: Box<Self>) {
        let Self {
            page,
            context_id,
            browser,
            _permit,
        } = *self;

        if let Err(e) = page.page.close().await {
            tracing::warn!("Failed to close page: {}", e);
        }
        dispose_context(&browser, context_id).await;
        tracing::debug!("Released browser session");
    }
}

/// Chromium-backed page.
pub struct ChromiumPage {
    page: Page,
    control_port: Option<u16>,
}

fn console_level(kind: &ConsoleApiCalledType) -> ConsoleLevel {
    match kind {
        ConsoleApiCalledType::Error => ConsoleLevel::Error,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        ConsoleApiCalledType::Log => ConsoleLevel::Log,
        _ => ConsoleLevel::Other,
    }
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .filter_map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => arg.description.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn header_map(headers: &serde_json::Value) -> HashMap<String, String> {
    headers
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let value = v.as_str().map_or_else(|| v.to_string(), ToString::to_string);
                    (k.to_ascii_lowercase(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Tracks in-flight requests to decide when a page has stopped fetching.
///
/// Events arrive on separate streams, so a request can be seen ending before
/// it is seen starting; such ids are remembered and never counted.
#[derive(Debug)]
struct NetworkIdle {
    in_flight: HashSet<String>,
    ended: HashSet<String>,
    quiet_period: Duration,
    quiet_since: Option<Instant>,
}

impl NetworkIdle {
    fn new(quiet_period: Duration, now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            ended: HashSet::new(),
            quiet_period,
            quiet_since: Some(now),
        }
    }

    fn request_started(&mut self, request_id: &str) {
        if self.ended.contains(request_id) {
            return;
        }
        self.in_flight.insert(request_id.to_string());
        self.quiet_since = None;
    }

    fn request_ended(&mut self, request_id: &str, now: Instant) {
        if !self.in_flight.remove(request_id) {
            self.ended.insert(request_id.to_string());
        }
        if self.in_flight.is_empty() && self.quiet_since.is_none() {
            self.quiet_since = Some(now);
        }
    }

    /// When the page becomes idle if nothing else starts; `None` while busy.
    fn idle_at(&self) -> Option<Instant> {
        self.quiet_since.map(|since| since + self.quiet_period)
    }
}

/// Wait until no request has been in flight for [`NETWORK_QUIET_PERIOD`].
///
/// Gives up at `deadline` and leaves the page as it is: the load event has
/// already fired, so a long-polling page is still worth auditing.
async fn wait_for_network_idle<S, F, E>(started: S, finished: F, failed: E, deadline: Instant)
where
    S: futures_util::Stream<Item = Arc<EventRequestWillBeSent>>,
    F: futures_util::Stream<Item = Arc<EventLoadingFinished>>,
    E: futures_util::Stream<Item = Arc<EventLoadingFailed>>,
{
    futures_util::pin_mut!(started, finished, failed);
    let mut idle = NetworkIdle::new(NETWORK_QUIET_PERIOD, Instant::now());
    loop {
        let wake = idle.idle_at().map_or(deadline, |at| at.min(deadline));
        tokio::select! {
            Some(event) = started.next() => idle.request_started(event.request_id.inner()),
            Some(event) = finished.next() => {
                idle.request_ended(event.request_id.inner(), Instant::now());
            }
            Some(event) = failed.next() => {
                idle.request_ended(event.request_id.inner(), Instant::now());
            }
            () = tokio::time::sleep_until(wake) => {
                if idle.idle_at().is_none() {
                    tracing::debug!(
                        "Network still busy at navigation deadline ({} request(s) in flight)",
                        idle.in_flight.len()
                    );
                }
                return;
            }
        }
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<NavigationResponse> {
        let deadline = Instant::now() + timeout;
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;
        let started = self.page.event_listener::<EventRequestWillBeSent>().await?;
        let finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let failed = self.page.event_listener::<EventLoadingFailed>().await?;

        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
            Ok::<_, BrowserError>(())
        };

        tokio::time::timeout_at(deadline, navigation)
            .await
            .map_err(|_| BrowserError::Timeout(format!("navigation to {url} exceeded {timeout:?}")))??;

        wait_for_network_idle(started, finished, failed, deadline).await;

        // Last main-document response wins so redirects resolve to the final hop.
        let mut document = None;
        while let Some(Some(event)) = responses.next().now_or_never() {
            if event.r#type == ResourceType::Document {
                document = Some(event);
            }
        }

        Ok(match document {
            Some(event) => NavigationResponse {
                url: event.response.url.clone(),
                status: u16::try_from(event.response.status).ok(),
                headers: header_map(event.response.headers.inner()),
            },
            None => NavigationResponse {
                url: url.to_string(),
                ..NavigationResponse::default()
            },
        })
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await?;
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Evaluation)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn capture_console(&self, limit: usize) -> Result<ConsoleCapture> {
        let events = self.page.event_listener::<EventConsoleApiCalled>().await?;
        let messages = events.map(|event| ConsoleMessage {
            level: console_level(&event.r#type),
            text: console_text(&event),
        });
        Ok(ConsoleCapture::spawn(messages, limit))
    }

    fn control_port(&self) -> Option<u16> {
        self.control_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_lowercases_names() {
        let headers = serde_json::json!({
            "Content-Security-Policy": "default-src 'self'",
            "X-Frame-Options": "DENY",
            "Content-Length": 42
        });
        let map = header_map(&headers);

        assert_eq!(
            map.get("content-security-policy").map(String::as_str),
            Some("default-src 'self'")
        );
        assert_eq!(map.get("x-frame-options").map(String::as_str), Some("DENY"));
        assert_eq!(map.get("content-length").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_header_map_non_object() {
        assert!(header_map(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn test_console_level_mapping() {
        assert_eq!(console_level(&ConsoleApiCalledType::Error), ConsoleLevel::Error);
        assert_eq!(console_level(&ConsoleApiCalledType::Warning), ConsoleLevel::Warning);
        assert_eq!(console_level(&ConsoleApiCalledType::Table), ConsoleLevel::Other);
    }

    #[test]
    fn test_network_idle_after_quiet_period() {
        let start = Instant::now();
        let quiet = Duration::from_millis(500);
        let mut idle = NetworkIdle::new(quiet, start);
        assert_eq!(idle.idle_at(), Some(start + quiet));

        idle.request_started("1");
        idle.request_started("2");
        assert_eq!(idle.idle_at(), None);

        idle.request_ended("1", start + Duration::from_millis(100));
        assert_eq!(idle.idle_at(), None);

        let last = start + Duration::from_millis(300);
        idle.request_ended("2", last);
        assert_eq!(idle.idle_at(), Some(last + quiet));
    }

    #[test]
    fn test_network_idle_restarts_on_new_request() {
        let start = Instant::now();
        let quiet = Duration::from_millis(500);
        let mut idle = NetworkIdle::new(quiet, start);

        idle.request_started("1");
        idle.request_ended("1", start + Duration::from_millis(50));
        idle.request_started("2");
        assert_eq!(idle.idle_at(), None);

        // Redirect hops reuse the request id
        idle.request_started("2");
        let done = start + Duration::from_millis(900);
        idle.request_ended("2", done);
        assert_eq!(idle.idle_at(), Some(done + quiet));

        // Completions for requests seen before tracking began change nothing
        idle.request_ended("unknown", done + Duration::from_millis(200));
        assert_eq!(idle.idle_at(), Some(done + quiet));
    }

    #[test]
    fn test_network_idle_end_seen_before_start() {
        let start = Instant::now();
        let quiet = Duration::from_millis(500);
        let mut idle = NetworkIdle::new(quiet, start);

        idle.request_ended("7", start);
        idle.request_started("7");
        assert_eq!(idle.idle_at(), Some(start + quiet));
    }

    #[test]
    fn test_pool_starts_unlaunched() {
        let mut config = BrowserConfig::default();
        config.max_sessions = 3;
        let pool = SessionPool::new(config);

        assert!(!pool.is_launched());
        assert_eq!(pool.available_sessions(), 3);
    }
}
