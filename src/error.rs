//! Error taxonomy and process exit codes.
//!
//! Errors are layered the way a run progresses:
//! - [`ConfigError`]: anything wrong with the inputs, detected before a browser starts
//! - [`CaptureError`]: a single browser session operation failed
//! - [`PipelineError`]: a run-level failure (session start, aborted target, artifact I/O)
//!
//! [`WebdiffError`] joins the first and last and maps them to exit codes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::capture::Side;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for browser session operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Exit code for a completed run
pub const EXIT_OK: u8 = 0;

/// Exit code for invalid arguments, profile, template, cookie or input files
pub const EXIT_CONFIG: u8 = 1;

/// Exit code for failures after the browsers were started
pub const EXIT_RUNTIME: u8 = 2;

/// Exit code for a completed run with mismatches when `--fail-on-diff` is set
pub const EXIT_DIFFERS: u8 = 3;

/// Errors in the run's inputs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} '{path}' not found")]
    NotFound { what: &'static str, path: PathBuf },

    #[error("failed to read {what} '{path}': {source}")]
    Read {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile '{path}': {source}")]
    Profile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cookie file '{path}', line {line}: {message}")]
    Cookie {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid base URL '{input}': {source}")]
    BaseUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Errors from a single browser session
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to connect to WebDriver at {url}: {message}")]
    Connect { url: String, message: String },

    #[error("navigation to '{url}' failed: {message}")]
    Navigation { url: String, message: String },

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("wait condition not satisfied within {0:?}")]
    WaitTimeout(Duration),

    #[error("page was not captured within {0:?}")]
    PageTimeout(Duration),

    #[error("{operation} did not finish within {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("invalid screenshot data: {0}")]
    Decode(#[from] image::ImageError),

    #[error("browser command failed: {0}")]
    Command(String),
}

/// Run-level failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start {side} session: {source}")]
    SessionStart {
        side: Side,
        #[source]
        source: CaptureError,
    },

    #[error("failed to install cookies in {side} session: {source}")]
    Cookies {
        side: Side,
        #[source]
        source: CaptureError,
    },

    #[error("target #{index} '{target}' failed on {side} side: {source}")]
    Capture {
        index: usize,
        target: String,
        side: Side,
        #[source]
        source: CaptureError,
    },

    #[error("failed to write '{path}': {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save image '{path}': {source}")]
    ArtifactImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to serialize results: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("run cancelled")]
    Cancelled,
}

/// Top-level error of a webdiff invocation
#[derive(Debug, Error)]
pub enum WebdiffError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("runtime error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl WebdiffError {
    /// Process exit code for this error category
    pub fn exit_code(&self) -> u8 {
        match self {
            WebdiffError::Config(_) => EXIT_CONFIG,
            WebdiffError::Pipeline(_) => EXIT_RUNTIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        let config = WebdiffError::from(ConfigError::Invalid("x".into()));
        let runtime = WebdiffError::from(PipelineError::Cancelled);
        assert_eq!(config.exit_code(), EXIT_CONFIG);
        assert_eq!(runtime.exit_code(), EXIT_RUNTIME);
        assert_ne!(EXIT_CONFIG, EXIT_RUNTIME);
        assert_ne!(EXIT_DIFFERS, EXIT_OK);
    }

    #[test]
    fn test_capture_error_names_stage() {
        let err = PipelineError::Capture {
            index: 3,
            target: "/about".into(),
            side: Side::Right,
            source: CaptureError::WaitTimeout(Duration::from_secs(2)),
        };
        let message = err.to_string();
        assert!(message.contains("#3"));
        assert!(message.contains("/about"));
        assert!(message.contains("right"));
    }
}
