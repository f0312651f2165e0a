//! [`CaptureSession`] over the W3C WebDriver protocol.
//!
//! Works against chromedriver, geckodriver or a Selenium grid. Screenshots
//! are device pixels, so scroll distances are converted through
//! `window.devicePixelRatio` to keep both in the same unit.

use async_trait::async_trait;
use fantoccini::cookies::Cookie;
use fantoccini::{Client, ClientBuilder};
use image::RgbaImage;
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use url::Url;

use super::session::{CaptureSession, HttpResponse, SessionLauncher, Side};
use crate::cookies::CookieSpec;
use crate::error::{CaptureError, CaptureResult};
use crate::profile::{Browser, DriverSettings, WindowSettings};

const DEVICE_PIXEL_RATIO_SCRIPT: &str = "return window.devicePixelRatio || 1;";

// `behavior: 'instant'` overrides CSS `scroll-behavior: smooth`, which would
// leave `scrollY` at the old position when read right after the call
const SCROLL_SCRIPT: &str = "window.scrollBy({ top: arguments[0], left: 0, behavior: 'instant' }); \
     return Math.round(window.scrollY * (window.devicePixelRatio || 1));";

const RESPONSE_SCRIPT: &str = r#"
    var nav = (performance.getEntriesByType && performance.getEntriesByType('navigation')[0]) || {};
    return { status: nav.responseStatus || null, contentType: document.contentType || null };
"#;

/// A browser driven through WebDriver
pub struct WebDriverSession {
    client: Client,
    base_url: Url,
    device_pixel_ratio: f64,
}

impl WebDriverSession {
    /// Start a browser, size its window and open `base_url`
    pub async fn start(
        base_url: Url,
        driver: &DriverSettings,
        window: &WindowSettings,
    ) -> CaptureResult<Self> {
        let webdriver_url = driver.webdriver_url();
        info!(browser = ?driver.browser, %webdriver_url, "Starting browser");

        let client = ClientBuilder::rustls()
            .capabilities(capabilities(driver, window))
            .connect(&webdriver_url)
            .await
            .map_err(|e| CaptureError::Connect {
                url: webdriver_url.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = client.set_window_size(window.width, window.height).await {
            // Some drivers (mobile emulation, grids) refuse resizing
            debug!("Could not set window size: {}", e);
        }

        client
            .goto(base_url.as_str())
            .await
            .map_err(|e| CaptureError::Navigation {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;

        let device_pixel_ratio = client
            .execute(DEVICE_PIXEL_RATIO_SCRIPT, vec![])
            .await
            .map_err(command_error)?
            .as_f64()
            .filter(|ratio| *ratio > 0.0)
            .unwrap_or(1.0);

        info!(%base_url, device_pixel_ratio, "Started browser");
        Ok(Self {
            client,
            base_url,
            device_pixel_ratio,
        })
    }
}

fn command_error(err: fantoccini::error::CmdError) -> CaptureError {
    CaptureError::Command(err.to_string())
}

/// Browser capabilities for a new session
fn capabilities(driver: &DriverSettings, window: &WindowSettings) -> Map<String, Value> {
    let mut caps = Map::new();
    match driver.browser {
        Browser::Chrome => {
            let mut args = vec!["--no-sandbox".to_string(), "--hide-scrollbars".to_string()];
            if driver.headless {
                args.push("--headless=new".to_string());
                args.push("--disable-gpu".to_string());
                args.push("--disable-dev-shm-usage".to_string());
            }
            args.push(format!("--window-size={},{}", window.width, window.height));
            args.extend(driver.args.iter().cloned());

            let mut options = Map::new();
            options.insert("args".to_string(), json!(args));
            if let Some(device) = &driver.mobile_device {
                options.insert("mobileEmulation".to_string(), json!({ "deviceName": device }));
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), Value::Object(options));
        }
        Browser::Firefox => {
            let mut args = Vec::new();
            if driver.headless {
                args.push("--headless".to_string());
            }
            args.push(format!("--width={}", window.width));
            args.push(format!("--height={}", window.height));
            args.extend(driver.args.iter().cloned());

            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

#[async_trait]
impl CaptureSession for WebDriverSession {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn navigate(&mut self, url: &Url) -> CaptureResult<()> {
        debug!(%url, "Navigating");
        self.client
            .goto(url.as_str())
            .await
            .map_err(|e| CaptureError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn execute_script(&mut self, code: &str) -> CaptureResult<Value> {
        self.client
            .execute(code, vec![])
            .await
            .map_err(|e| CaptureError::Script(e.to_string()))
    }

    async fn capture_viewport(&mut self) -> CaptureResult<RgbaImage> {
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        Ok(image::load_from_memory(&png)?.to_rgba8())
    }

    async fn scroll_by(&mut self, dy: u32) -> CaptureResult<u32> {
        let css_pixels = f64::from(dy) / self.device_pixel_ratio;
        let position = self
            .client
            .execute(SCROLL_SCRIPT, vec![json!(css_pixels)])
            .await
            .map_err(command_error)?;
        position
            .as_f64()
            .map(|p| p.max(0.0).round() as u32)
            .ok_or_else(|| CaptureError::Command(format!("unexpected scroll position {}", position)))
    }

    async fn http_response(&mut self) -> CaptureResult<HttpResponse> {
        let value = self
            .client
            .execute(RESPONSE_SCRIPT, vec![])
            .await
            .map_err(command_error)?;

        let mut response = HttpResponse {
            status: value
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            ..Default::default()
        };
        if let Some(content_type) = value.get("contentType").and_then(Value::as_str) {
            response
                .headers
                .insert("Content-Type".to_string(), content_type.to_string());
        }
        Ok(response)
    }

    async fn add_cookie(&mut self, cookie: &CookieSpec) -> CaptureResult<()> {
        let parsed = Cookie::parse(cookie.to_string())
            .map_err(|e| CaptureError::Command(format!("invalid cookie '{}': {}", cookie.name, e)))?;
        self.client.add_cookie(parsed).await.map_err(command_error)
    }

    async fn dispose(&mut self) -> CaptureResult<()> {
        self.client.clone().close().await.map_err(command_error)
    }
}

/// Launches [`WebDriverSession`]s from profile settings
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    driver: DriverSettings,
    window: WindowSettings,
}

impl WebDriverLauncher {
    pub fn new(driver: DriverSettings, window: WindowSettings) -> Self {
        Self { driver, window }
    }
}

#[async_trait]
impl SessionLauncher for WebDriverLauncher {
    async fn launch(&self, side: Side, base_url: &Url) -> CaptureResult<Box<dyn CaptureSession>> {
        debug!(%side, "Launching session");
        let session = WebDriverSession::start(base_url.clone(), &self.driver, &self.window).await?;
        Ok(Box::new(session))
    }
}
