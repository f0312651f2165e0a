//! Profile files: the TOML settings of a comparison run.
//!
//! Every section and key is optional. A minimal profile is an empty file.
//!
//! ```toml
//! [driver]
//! browser = "chrome"
//! cookies = "cookies.txt"
//!
//! [window]
//! width = 1280
//! height = 1024
//!
//! [wait]
//! kind = "script"
//! script = "return window.appReady === true"
//!
//! [compare]
//! pixels_threshold = 20
//! tolerance = 8
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::{ScreenshotAssembler, WaitCondition};
use crate::config;
use crate::diff::CompareSettings;
use crate::error::{ConfigError, ConfigResult};

/// Settings of one comparison run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub driver: DriverSettings,
    pub window: WindowSettings,
    pub script: ScriptSettings,
    pub wait: WaitCondition,
    pub capture: CaptureSettings,
    pub compare: CompareSettings,
}

/// Browser family to start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

/// How to start the browsers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub browser: Browser,
    /// WebDriver endpoint; `WEBDIFF_WEBDRIVER_URL` or chromedriver's default when unset
    pub webdriver_url: Option<String>,
    pub headless: bool,
    /// Extra browser command-line arguments
    pub args: Vec<String>,
    /// Chrome mobile emulation device name, e.g. "Pixel 7"
    pub mobile_device: Option<String>,
    /// Cookie file, relative to the profile
    pub cookies: Option<PathBuf>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            browser: Browser::Chrome,
            webdriver_url: None,
            headless: true,
            args: Vec::new(),
            mobile_device: None,
            cookies: None,
        }
    }
}

impl DriverSettings {
    pub fn webdriver_url(&self) -> String {
        self.webdriver_url
            .clone()
            .unwrap_or_else(config::webdriver_url)
    }
}

/// Browser window size in CSS pixels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// Script run after every navigation or script target
    pub on_load: Option<String>,
}

/// Page capture limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Scroll steps before a page is considered endless
    pub max_scrolls: u32,
    /// Pause after each scroll before capturing
    pub scroll_delay_ms: u64,
    /// Bound on loading, waiting and capturing one page
    pub page_timeout_secs: u64,
    /// Capture left and right at the same time
    pub parallel: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_scrolls: crate::capture::assembler::DEFAULT_MAX_SCROLLS,
            scroll_delay_ms: 0,
            page_timeout_secs: 60,
            parallel: true,
        }
    }
}

impl CaptureSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn assembler(&self) -> ScreenshotAssembler {
        ScreenshotAssembler::new(self.max_scrolls, Duration::from_millis(self.scroll_delay_ms))
    }
}

impl Profile {
    /// Parse a profile from TOML text
    pub fn from_toml(text: &str, path: &Path) -> ConfigResult<Self> {
        let profile: Profile = toml::from_str(text).map_err(|source| ConfigError::Profile {
            path: path.to_path_buf(),
            source,
        })?;
        profile.validate()?;
        Ok(profile)
    }

    /// Read and parse a profile file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            what: "profile",
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Cookie file location, resolved against the profile's directory
    pub fn cookies_path(&self, profile_path: &Path) -> Option<PathBuf> {
        let cookies = self.driver.cookies.as_ref()?;
        if cookies.is_absolute() {
            return Some(cookies.clone());
        }
        let dir = profile_path.parent().unwrap_or_else(|| Path::new(""));
        Some(dir.join(cookies))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be positive",
                self.window.width, self.window.height
            )));
        }
        if self.capture.page_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "capture.page_timeout_secs must be positive".to_string(),
            ));
        }
        if !self.compare.tolerance.is_finite() || self.compare.tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "compare.tolerance {} must be a non-negative number",
                self.compare.tolerance
            )));
        }
        Ok(())
    }
}
