//! Configuration management with environment variable support.
//!
//! Command-line flags win over environment variables, which win over the
//! defaults below. The per-run comparison settings live in the TOML profile
//! (see [`crate::profile`]); this module only covers where things are.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEBDIFF_OUTPUT` | Reports output directory | `.` |
//! | `WEBDIFF_PROFILE` | Profile TOML file | `profile.toml` |
//! | `WEBDIFF_TEMPLATE` | HTML report template | `template.html` |
//! | `WEBDIFF_WEBDRIVER_URL` | WebDriver endpoint used when the profile has none | `http://localhost:9515` |
//! | `WEBDIFF_LOG` | Log filter used when `RUST_LOG` is unset | `webdiff=info` |
//!
//! # Example
//!
//! ```bash
//! export WEBDIFF_WEBDRIVER_URL="http://selenium-grid:4444"
//! webdiff https://prod.example.com https://staging.example.com urls.txt
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default reports output directory
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Default profile file
pub const DEFAULT_PROFILE: &str = "profile.toml";

/// Default HTML report template
pub const DEFAULT_TEMPLATE: &str = "template.html";

/// Default WebDriver endpoint (chromedriver's default port)
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Default log filter
pub const DEFAULT_LOG_FILTER: &str = "webdiff=info";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the output directory
pub const ENV_OUTPUT_DIR: &str = "WEBDIFF_OUTPUT";

/// Environment variable for the profile path
pub const ENV_PROFILE: &str = "WEBDIFF_PROFILE";

/// Environment variable for the template path
pub const ENV_TEMPLATE: &str = "WEBDIFF_TEMPLATE";

/// Environment variable for the WebDriver endpoint
pub const ENV_WEBDRIVER_URL: &str = "WEBDIFF_WEBDRIVER_URL";

/// Environment variable for the log filter
pub const ENV_LOG: &str = "WEBDIFF_LOG";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for webdiff
#[derive(Debug, Clone)]
pub struct Config {
    /// Input and output locations
    pub paths: PathSettings,
    /// Browser driver defaults
    pub driver: DriverDefaults,
    /// Log filter directive
    pub log_filter: String,
}

/// Input and output locations
#[derive(Debug, Clone)]
pub struct PathSettings {
    /// Directory receiving one timestamped folder per run
    pub output_dir: String,
    /// Profile TOML file
    pub profile: String,
    /// HTML report template
    pub template: String,
}

/// Browser driver defaults
#[derive(Debug, Clone)]
pub struct DriverDefaults {
    /// WebDriver endpoint
    pub webdriver_url: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            paths: PathSettings::from_env(),
            driver: DriverDefaults::from_env(),
            log_filter: env::var(ENV_LOG).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            paths: PathSettings::defaults(),
            driver: DriverDefaults::defaults(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PathSettings {
    pub fn from_env() -> Self {
        Self {
            output_dir: env::var(ENV_OUTPUT_DIR).unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string()),
            profile: env::var(ENV_PROFILE).unwrap_or_else(|_| DEFAULT_PROFILE.to_string()),
            template: env::var(ENV_TEMPLATE).unwrap_or_else(|_| DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl DriverDefaults {
    pub fn from_env() -> Self {
        Self {
            webdriver_url: env::var(ENV_WEBDRIVER_URL)
                .unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Locate a file, also trying `path` with `ext` appended.
///
/// `-p staging` finds `staging.toml`, `-t report` finds `report.html`.
pub fn find_with_optional_ext(path: &Path, ext: &str) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let ext = ext.trim_start_matches('.');
    let has_ext = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false);
    if has_ext {
        return None;
    }
    let mut with_ext = path.as_os_str().to_owned();
    with_ext.push(".");
    with_ext.push(ext);
    let candidate = PathBuf::from(with_ext);
    candidate.is_file().then_some(candidate)
}

/// Get the WebDriver endpoint (convenience function)
pub fn webdriver_url() -> String {
    get().driver.webdriver_url.clone()
}

/// Get the log filter (convenience function)
pub fn log_filter() -> String {
    get().log_filter.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.paths.output_dir, DEFAULT_OUTPUT_DIR);
        assert_eq!(config.paths.profile, DEFAULT_PROFILE);
        assert_eq!(config.paths.template, DEFAULT_TEMPLATE);
        assert_eq!(config.driver.webdriver_url, DEFAULT_WEBDRIVER_URL);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_find_with_optional_ext() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("staging.toml");
        std::fs::write(&profile, "").unwrap();

        assert_eq!(find_with_optional_ext(&profile, ".toml"), Some(profile.clone()));
        assert_eq!(
            find_with_optional_ext(&dir.path().join("staging"), ".toml"),
            Some(profile)
        );
        assert_eq!(find_with_optional_ext(&dir.path().join("missing"), "toml"), None);
        assert_eq!(find_with_optional_ext(&dir.path().join("missing.toml"), "toml"), None);
    }
}
