//! webdiff - visual regression testing between two deployments.
//!
//! This crate provides:
//! - Full-page screenshots of live pages over WebDriver, stitched from viewport captures
//! - Pixel-level comparison with tolerance, a sparse diff map and a rendered diff image
//! - A pipeline that captures both environments concurrently, target by target
//! - A static report bundle (`index.html` + `results.js`) per run
//! - An in-process mock browser for testing
//!
//! # Example
//!
//! ```rust,no_run
//! use webdiff::run::{RunOptions, run};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), webdiff::WebdiffError> {
//! let mut options = RunOptions::new("https://prod.example.com/", "https://staging.example.com/");
//! options.input = Some("urls.txt".into());
//! let report = run(&options, CancellationToken::new()).await?;
//! println!("{} differences, report in {}", report.mismatches(), report.run_dir.display());
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod cookies;
pub mod diff;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod run;
pub mod target;

// Re-export session types
pub use capture::{
    CaptureSession, HttpResponse, MockLauncher, MockPage, MockSession, PageCanvas, ScreenshotAssembler,
    SessionLauncher, Side, WaitCondition, WebDriverLauncher, WebDriverSession,
};

// Re-export comparison types
pub use diff::{CompareSettings, DiffEntry, DiffMap, DiffResult, DistanceMetric, PixelComparator};

// Re-export pipeline and report types
pub use pipeline::{CapturedPage, ComparisonPipeline, FailurePolicy, PipelineSettings};
pub use report::{Diff, DiffStatus, Img, ImgSize, Page, ResultsAggregate, RunDirectory};

pub use cookies::CookieSpec;
pub use error::{CaptureError, ConfigError, PipelineError, WebdiffError};
pub use profile::Profile;
pub use target::{Target, parse_targets};
