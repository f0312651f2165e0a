//! The browser capability the comparison core depends on.
//!
//! A [`CaptureSession`] is one remote browser bound to one base URL. The
//! pipeline only ever talks to this trait; [`crate::capture::WebDriverSession`]
//! drives a real browser and [`crate::capture::MockSession`] is the in-process
//! double used by tests.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

use crate::cookies::CookieSpec;
use crate::error::{CaptureError, CaptureResult};

/// Script polled by [`WaitCondition::DocumentReady`]
pub const DOCUMENT_READY_SCRIPT: &str = "return document.readyState === 'complete';";

/// Which environment a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// HTTP metadata of the last navigation. Opaque to the comparison core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HttpResponse {
    /// Status code, when the browser exposes it
    pub status: Option<u16>,
    /// Response headers known to the session
    pub headers: BTreeMap<String, String>,
}

/// Condition applied after navigation and the on-load script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitCondition {
    /// Capture immediately
    None,
    /// Sleep for a fixed time
    Delay { delay_ms: u64 },
    /// Poll until `document.readyState` is `complete`
    DocumentReady {
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_poll_ms")]
        poll_ms: u64,
    },
    /// Poll a script until it returns a truthy value
    Script {
        script: String,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_poll_ms")]
        poll_ms: u64,
    },
}

fn default_wait_timeout_ms() -> u64 {
    10_000
}

fn default_poll_ms() -> u64 {
    100
}

impl Default for WaitCondition {
    fn default() -> Self {
        WaitCondition::DocumentReady {
            timeout_ms: default_wait_timeout_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

/// One remote browser bound to one base URL.
///
/// Scroll positions and image sizes are both in screenshot pixels.
#[async_trait]
pub trait CaptureSession: Send {
    /// Base URL relative targets are resolved against
    fn base_url(&self) -> &Url;

    /// Load `url` in the browser
    async fn navigate(&mut self, url: &Url) -> CaptureResult<()>;

    /// Run a script in the current page and return its result
    async fn execute_script(&mut self, code: &str) -> CaptureResult<Value>;

    /// Screenshot of the visible viewport
    async fn capture_viewport(&mut self) -> CaptureResult<RgbaImage>;

    /// Scroll down by `dy` pixels and return the new vertical scroll position
    async fn scroll_by(&mut self, dy: u32) -> CaptureResult<u32>;

    /// HTTP metadata of the last navigation
    async fn http_response(&mut self) -> CaptureResult<HttpResponse>;

    /// Install a cookie for the session's domain
    async fn add_cookie(&mut self, cookie: &CookieSpec) -> CaptureResult<()>;

    /// Block until `condition` holds; exceeding its timeout is an error
    async fn wait(&mut self, condition: &WaitCondition) -> CaptureResult<()> {
        wait_until(self, condition).await
    }

    /// Close the browser. The session must not be used afterwards.
    async fn dispose(&mut self) -> CaptureResult<()>;
}

/// Opens sessions for the two environments of a run
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, side: Side, base_url: &Url) -> CaptureResult<Box<dyn CaptureSession>>;
}

/// Evaluate a wait condition against any session
pub async fn wait_until<S>(session: &mut S, condition: &WaitCondition) -> CaptureResult<()>
where
    S: CaptureSession + ?Sized,
{
    match condition {
        WaitCondition::None => Ok(()),
        WaitCondition::Delay { delay_ms } => {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            Ok(())
        }
        WaitCondition::DocumentReady { timeout_ms, poll_ms } => {
            poll_script(session, DOCUMENT_READY_SCRIPT, *timeout_ms, *poll_ms).await
        }
        WaitCondition::Script {
            script,
            timeout_ms,
            poll_ms,
        } => poll_script(session, script, *timeout_ms, *poll_ms).await,
    }
}

async fn poll_script<S>(session: &mut S, script: &str, timeout_ms: u64, poll_ms: u64) -> CaptureResult<()>
where
    S: CaptureSession + ?Sized,
{
    let timeout = Duration::from_millis(timeout_ms);
    let deadline = Instant::now() + timeout;
    loop {
        let value = session.execute_script(script).await?;
        if is_truthy(&value) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(CaptureError::WaitTimeout(timeout));
        }
        tokio::time::sleep(Duration::from_millis(poll_ms.max(1))).await;
    }
}

/// JavaScript truthiness of a script result
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("complete")));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_wait_condition_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            wait: WaitCondition,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [wait]
            kind = "script"
            script = "return window.ready"
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.wait,
            WaitCondition::Script {
                script: "return window.ready".into(),
                timeout_ms: 10_000,
                poll_ms: 100,
            }
        );

        let parsed: Wrapper = toml::from_str("[wait]\nkind = \"delay\"\ndelay_ms = 250\n").unwrap();
        assert_eq!(parsed.wait, WaitCondition::Delay { delay_ms: 250 });
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Left.to_string(), "left");
        assert_eq!(Side::Right.to_string(), "right");
    }
}
