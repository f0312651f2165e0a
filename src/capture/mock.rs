//! In-process browser double.
//!
//! `MockSession` serves pre-rendered pages keyed by the path and query of the
//! navigated URL (or by the exact script text for script targets), scrolls
//! them through a fixed viewport, and records every operation. Pages that were
//! never registered are generated deterministically from their key, so two
//! mock sessions with different base URLs render the same relative path
//! identically unless a test says otherwise.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage, imageops};
use serde_json::Value;
use url::{Position, Url};

use super::canvas::{BLACK, PageCanvas, WHITE};
use super::session::{CaptureSession, HttpResponse, SessionLauncher, Side};
use crate::cookies::CookieSpec;
use crate::error::{CaptureError, CaptureResult};

/// Default mock viewport width (pixels)
pub const DEFAULT_MOCK_VIEWPORT_WIDTH: u32 = 320;

/// Default mock viewport height (pixels)
pub const DEFAULT_MOCK_VIEWPORT_HEIGHT: u32 = 240;

/// Default height of generated pages (pixels)
pub const DEFAULT_MOCK_PAGE_HEIGHT: u32 = 600;

/// Shared record of the operations a mock session performed
pub type SessionLog = Arc<Mutex<Vec<String>>>;

/// A page the mock browser can display
#[derive(Debug, Clone, PartialEq)]
pub struct MockPage {
    pub image: RgbaImage,
    pub response: HttpResponse,
}

impl MockPage {
    /// A page showing `image`, answered with HTTP 200
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            response: HttpResponse {
                status: Some(200),
                ..Default::default()
            },
        }
    }

    /// A white page with `label` written at the top and a band every 100 rows
    pub fn labelled(width: u32, height: u32, label: &str) -> Self {
        let mut canvas = PageCanvas::new(width, height);
        canvas.draw_text(4, 4, label, BLACK, WHITE);
        for band in (100..height).step_by(100) {
            canvas.draw_rect(0, band, width, 2, [200, 200, 200, 255]);
        }
        Self::new(canvas.into_image())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.response.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.response.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// Deterministic [`CaptureSession`] for tests
#[derive(Debug)]
pub struct MockSession {
    base_url: Url,
    viewport_width: u32,
    viewport_height: u32,
    page_height: u32,
    pages: HashMap<String, MockPage>,
    script_results: HashMap<String, VecDeque<Value>>,
    failing: HashSet<String>,
    latency: Duration,
    current_key: Option<String>,
    current: Option<MockPage>,
    scroll_y: u32,
    cookies: Vec<CookieSpec>,
    log: SessionLog,
    disposed: bool,
}

impl MockSession {
    /// Create a session for `base_url` with the default viewport
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            viewport_width: DEFAULT_MOCK_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_MOCK_VIEWPORT_HEIGHT,
            page_height: DEFAULT_MOCK_PAGE_HEIGHT,
            pages: HashMap::new(),
            script_results: HashMap::new(),
            failing: HashSet::new(),
            latency: Duration::ZERO,
            current_key: None,
            current: None,
            scroll_y: 0,
            cookies: Vec::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            disposed: false,
        }
    }

    /// Set the viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Height of pages generated for unregistered keys
    pub fn page_height(mut self, height: u32) -> Self {
        self.page_height = height;
        self
    }

    /// Register a page for a path (`/a?b=1`) or for a script target's text
    pub fn page(mut self, key: impl Into<String>, page: MockPage) -> Self {
        self.pages.insert(key.into(), page);
        self
    }

    /// Queue results for a script; the last one repeats once the queue drains
    pub fn script_results(mut self, script: impl Into<String>, results: impl IntoIterator<Item = Value>) -> Self {
        self.script_results
            .insert(script.into(), results.into_iter().collect());
        self
    }

    /// Make screenshots of the page at `key` fail
    pub fn failing(mut self, key: impl Into<String>) -> Self {
        self.failing.insert(key.into());
        self
    }

    /// Delay every navigation by `latency`
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handle to the operation log, usable after the session was moved
    pub fn log_handle(&self) -> SessionLog {
        Arc::clone(&self.log)
    }

    /// Operations performed so far
    pub fn history(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Cookies installed so far
    pub fn cookies(&self) -> &[CookieSpec] {
        &self.cookies
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    fn show(&mut self, key: String, page: MockPage) {
        self.current_key = Some(key);
        self.current = Some(page);
        self.scroll_y = 0;
    }

    fn current_height(&self) -> u32 {
        self.current
            .as_ref()
            .map(|page| page.image.height())
            .unwrap_or(self.viewport_height)
    }
}

#[async_trait]
impl CaptureSession for MockSession {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn navigate(&mut self, url: &Url) -> CaptureResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.record(format!("navigate {}", url));
        let key = url[Position::BeforePath..].to_string();
        let page = self
            .pages
            .get(&key)
            .cloned()
            .unwrap_or_else(|| MockPage::labelled(self.viewport_width, self.page_height, &key));
        self.show(key, page);
        Ok(())
    }

    async fn execute_script(&mut self, code: &str) -> CaptureResult<Value> {
        self.record(format!("script {}", code));
        if let Some(page) = self.pages.get(code).cloned() {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.show(code.to_string(), page);
            return Ok(Value::Null);
        }
        if let Some(queue) = self.script_results.get_mut(code) {
            let value = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            return Ok(value.unwrap_or(Value::Null));
        }
        Ok(Value::Bool(true))
    }

    async fn capture_viewport(&mut self) -> CaptureResult<RgbaImage> {
        if let Some(key) = &self.current_key {
            if self.failing.contains(key) {
                return Err(CaptureError::Screenshot(format!("mock failure for '{}'", key)));
            }
        }
        self.record(format!("capture {}", self.scroll_y));

        let mut view = RgbaImage::from_pixel(self.viewport_width, self.viewport_height, Rgba(WHITE));
        if let Some(page) = &self.current {
            let rows = page
                .image
                .height()
                .saturating_sub(self.scroll_y)
                .min(self.viewport_height);
            let cols = page.image.width().min(self.viewport_width);
            if rows > 0 && cols > 0 {
                let visible = imageops::crop_imm(&page.image, 0, self.scroll_y, cols, rows).to_image();
                imageops::replace(&mut view, &visible, 0, 0);
            }
        }
        Ok(view)
    }

    async fn scroll_by(&mut self, dy: u32) -> CaptureResult<u32> {
        let max_scroll = self.current_height().saturating_sub(self.viewport_height);
        self.scroll_y = self.scroll_y.saturating_add(dy).min(max_scroll);
        Ok(self.scroll_y)
    }

    async fn http_response(&mut self) -> CaptureResult<HttpResponse> {
        Ok(self
            .current
            .as_ref()
            .map(|page| page.response.clone())
            .unwrap_or_default())
    }

    async fn add_cookie(&mut self, cookie: &CookieSpec) -> CaptureResult<()> {
        self.record(format!("cookie {}", cookie.name));
        self.cookies.push(cookie.clone());
        Ok(())
    }

    async fn dispose(&mut self) -> CaptureResult<()> {
        self.record("dispose".to_string());
        self.disposed = true;
        Ok(())
    }
}

/// Hands out one prepared [`MockSession`] per side
#[derive(Debug, Default)]
pub struct MockLauncher {
    left: Mutex<Option<MockSession>>,
    right: Mutex<Option<MockSession>>,
    startup_delays: HashMap<Side, Duration>,
}

impl MockLauncher {
    pub fn new(left: MockSession, right: MockSession) -> Self {
        Self {
            left: Mutex::new(Some(left)),
            right: Mutex::new(Some(right)),
            startup_delays: HashMap::new(),
        }
    }

    /// A launcher whose `side` fails to start
    pub fn failing(side: Side, other: MockSession) -> Self {
        let (left, right) = match side {
            Side::Left => (None, Some(other)),
            Side::Right => (Some(other), None),
        };
        Self {
            left: Mutex::new(left),
            right: Mutex::new(right),
            startup_delays: HashMap::new(),
        }
    }

    /// Make starting the `side` session take `delay`
    pub fn startup_delay(mut self, side: Side, delay: Duration) -> Self {
        self.startup_delays.insert(side, delay);
        self
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn launch(&self, side: Side, base_url: &Url) -> CaptureResult<Box<dyn CaptureSession>> {
        let slot = match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        };
        let session = slot.lock().ok().and_then(|mut slot| slot.take());
        if let Some(delay) = self.startup_delays.get(&side) {
            tokio::time::sleep(*delay).await;
        }
        match session {
            Some(session) => Ok(Box::new(session)),
            None => Err(CaptureError::Connect {
                url: base_url.to_string(),
                message: format!("no mock session prepared for {} side", side),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://left.test/").unwrap()
    }

    #[tokio::test]
    async fn test_mock_scroll_is_clamped_to_page() {
        let mut session = MockSession::new(base()).viewport(100, 100).page_height(250);
        session.navigate(&base().join("/tall").unwrap()).await.unwrap();

        assert_eq!(session.scroll_by(0).await.unwrap(), 0);
        assert_eq!(session.scroll_by(100).await.unwrap(), 100);
        assert_eq!(session.scroll_by(100).await.unwrap(), 150);
        assert_eq!(session.scroll_by(100).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_mock_registered_page_and_response() {
        let page = MockPage::new(RgbaImage::from_pixel(10, 10, Rgba(BLACK)))
            .with_status(404)
            .with_header("Content-Type", "text/html");
        let mut session = MockSession::new(base()).viewport(10, 10).page("/missing?x=1", page);

        session
            .navigate(&base().join("/missing?x=1").unwrap())
            .await
            .unwrap();
        let view = session.capture_viewport().await.unwrap();
        let response = session.http_response().await.unwrap();

        assert_eq!(view.get_pixel(5, 5).0, BLACK);
        assert_eq!(response.status, Some(404));
        assert_eq!(response.headers.get("Content-Type").map(String::as_str), Some("text/html"));
    }

    #[tokio::test]
    async fn test_mock_script_results_repeat_last() {
        let mut session = MockSession::new(base())
            .script_results("ready()", [Value::Bool(false), Value::Bool(true)]);

        assert_eq!(session.execute_script("ready()").await.unwrap(), Value::Bool(false));
        assert_eq!(session.execute_script("ready()").await.unwrap(), Value::Bool(true));
        assert_eq!(session.execute_script("ready()").await.unwrap(), Value::Bool(true));
        assert_eq!(session.history().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_launcher_hands_out_once() {
        let launcher = MockLauncher::new(MockSession::new(base()), MockSession::new(base()));
        assert!(launcher.launch(Side::Left, &base()).await.is_ok());
        assert!(launcher.launch(Side::Left, &base()).await.is_err());
        assert!(launcher.launch(Side::Right, &base()).await.is_ok());
    }
}
