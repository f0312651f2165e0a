//! Target-by-target comparison of two environments.
//!
//! For every target both sessions load the page and capture it at the same
//! time. Only when both sides are done is the pair compared, persisted when it
//! differs, and appended to the results. Targets are handled one at a time in
//! input order, so report order and artifact indices follow the input.

use std::time::Duration;

use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::capture::{CaptureSession, HttpResponse, ScreenshotAssembler, Side, WaitCondition};
use crate::diff::{DiffResult, PixelComparator};
use crate::error::{CaptureError, CaptureResult, PipelineError, PipelineResult};
use crate::profile::Profile;
use crate::report::{ArtifactNames, Diff, Img, Page, ResultsAggregate, RunDirectory};
use crate::target::Target;

/// What a failed capture does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run at the first failed target
    #[default]
    Abort,
    /// Record the target as failed and go on
    Continue,
}

/// Per-target behaviour of a run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Script run after each navigation or script target
    pub on_load: Option<String>,
    pub wait: WaitCondition,
    /// Bound on one side's load, wait and capture
    pub page_timeout: Duration,
    /// Capture both sides concurrently
    pub parallel: bool,
    pub failure_policy: FailurePolicy,
}

impl PipelineSettings {
    pub fn from_profile(profile: &Profile, failure_policy: FailurePolicy) -> Self {
        Self {
            on_load: profile.script.on_load.clone(),
            wait: profile.wait.clone(),
            page_timeout: profile.capture.page_timeout(),
            parallel: profile.capture.parallel,
            failure_policy,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_profile(&Profile::default(), FailurePolicy::Abort)
    }
}

/// One side's capture of a target
#[derive(Debug, Clone)]
pub struct CapturedPage {
    /// Navigated URL, unset for script targets
    pub url: Option<Url>,
    pub response: HttpResponse,
    pub image: RgbaImage,
}

impl CapturedPage {
    fn page(&self, img: Img) -> Page {
        Page {
            url: self.url.as_ref().map(Url::to_string),
            response: self.response.clone(),
            img,
        }
    }
}

/// Runs targets through capture, comparison and persistence
pub struct ComparisonPipeline {
    settings: PipelineSettings,
    comparator: PixelComparator,
    assembler: ScreenshotAssembler,
    output: RunDirectory,
    cancel: CancellationToken,
}

impl ComparisonPipeline {
    pub fn new(
        settings: PipelineSettings,
        comparator: PixelComparator,
        assembler: ScreenshotAssembler,
        output: RunDirectory,
    ) -> Self {
        Self {
            settings,
            comparator,
            assembler,
            output,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn output(&self) -> &RunDirectory {
        &self.output
    }

    /// Process all targets in order and return how many did not match.
    ///
    /// Records are appended to `results` as targets finish; on error the
    /// records of earlier targets stay in place.
    pub async fn run(
        &self,
        targets: &[Target],
        left: &mut dyn CaptureSession,
        right: &mut dyn CaptureSession,
        results: &mut ResultsAggregate,
    ) -> PipelineResult<usize> {
        for target in targets {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let diff = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                diff = self.process_target(target, left, right) => diff?,
            };
            results.record(diff);
        }
        Ok(results.mismatch_count())
    }

    /// Capture, compare and persist one target
    pub async fn process_target(
        &self,
        target: &Target,
        left: &mut dyn CaptureSession,
        right: &mut dyn CaptureSession,
    ) -> PipelineResult<Diff> {
        debug!(index = target.index(), %target, "Processing target");
        let (left_page, right_page) = self.capture_pair(target, left, right).await;

        let (left_page, right_page) = match (left_page, right_page) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(source), _) => return self.capture_failed(target, Side::Left, source, left, right),
            (_, Err(source)) => return self.capture_failed(target, Side::Right, source, left, right),
        };

        let result = self.comparator.compare(&left_page.image, &right_page.image);
        log_outcome(target, &result);

        let (left_img, right_img, diff_img) = if result.are_same {
            (
                Img::unsaved(left_page.image.width(), left_page.image.height()),
                Img::unsaved(right_page.image.width(), right_page.image.height()),
                Img::unsaved(result.width(), result.height()),
            )
        } else {
            self.persist(target, &left_page.image, &right_page.image, &result.image)?
        };

        Ok(Diff::compared(
            target,
            left_page.page(left_img),
            right_page.page(right_img),
            diff_img,
            result,
        ))
    }

    /// Both sides of a target; returns once both finished or failed
    async fn capture_pair(
        &self,
        target: &Target,
        left: &mut dyn CaptureSession,
        right: &mut dyn CaptureSession,
    ) -> (CaptureResult<CapturedPage>, CaptureResult<CapturedPage>) {
        if self.settings.parallel {
            tokio::join!(
                self.capture_side(Side::Left, target, left),
                self.capture_side(Side::Right, target, right)
            )
        } else {
            let l = self.capture_side(Side::Left, target, left).await;
            let r = self.capture_side(Side::Right, target, right).await;
            (l, r)
        }
    }

    async fn capture_side(
        &self,
        side: Side,
        target: &Target,
        session: &mut dyn CaptureSession,
    ) -> CaptureResult<CapturedPage> {
        let url = target_url(target, session.base_url())?;
        let timeout = self.settings.page_timeout;
        let page = tokio::time::timeout(timeout, self.load_and_capture(target, url, session))
            .await
            .map_err(|_| CaptureError::PageTimeout(timeout))??;
        debug!(%side, width = page.image.width(), height = page.image.height(), "Captured");
        Ok(page)
    }

    async fn load_and_capture(
        &self,
        target: &Target,
        url: Option<Url>,
        session: &mut dyn CaptureSession,
    ) -> CaptureResult<CapturedPage> {
        match &url {
            Some(url) => session.navigate(url).await?,
            None => {
                session.execute_script(target.text()).await?;
            }
        }
        if let Some(script) = &self.settings.on_load {
            session.execute_script(script).await?;
        }
        session.wait(&self.settings.wait).await?;

        let image = self.assembler.capture(session).await?;
        let response = session.http_response().await?;
        Ok(CapturedPage { url, response, image })
    }

    fn capture_failed(
        &self,
        target: &Target,
        side: Side,
        source: CaptureError,
        left: &dyn CaptureSession,
        right: &dyn CaptureSession,
    ) -> PipelineResult<Diff> {
        match self.settings.failure_policy {
            FailurePolicy::Abort => Err(PipelineError::Capture {
                index: target.index(),
                target: target.to_string(),
                side,
                source,
            }),
            FailurePolicy::Continue => {
                warn!("Failed: {} ({} side: {})", target, side, source);
                let page = |session: &dyn CaptureSession| Page {
                    url: target_url(target, session.base_url())
                        .ok()
                        .flatten()
                        .map(|url| url.to_string()),
                    ..Default::default()
                };
                Ok(Diff::failed(
                    target,
                    page(left),
                    page(right),
                    format!("{} side: {}", side, source),
                ))
            }
        }
    }

    fn persist(
        &self,
        target: &Target,
        left: &RgbaImage,
        right: &RgbaImage,
        diff: &RgbaImage,
    ) -> PipelineResult<(Img, Img, Img)> {
        let names = ArtifactNames::for_target(target.index(), target.text());
        self.output.save_image(&names.left, left)?;
        self.output.save_image(&names.right, right)?;
        self.output.save_image(&names.diff, diff)?;
        Ok((
            Img::saved(&names.left, left.width(), left.height()),
            Img::saved(&names.right, right.width(), right.height()),
            Img::saved(&names.diff, diff.width(), diff.height()),
        ))
    }
}

fn target_url(target: &Target, base: &Url) -> CaptureResult<Option<Url>> {
    target
        .url_on(base)
        .transpose()
        .map_err(|e| CaptureError::Navigation {
            url: target.text().to_string(),
            message: e.to_string(),
        })
}

fn log_outcome(target: &Target, result: &DiffResult) {
    if result.are_same {
        info!("Same: {}", target);
    } else {
        warn!("Diff: {}", target);
    }
    info!(
        "      Match {:.1}% ({} / {} pixels)",
        result.match_ratio() * 100.0,
        result.unmatched,
        result.total_pixels()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockPage, MockSession};
    use crate::diff::CompareSettings;
    use chrono::Local;
    use serde_json::Value;
    use tempfile::TempDir;

    fn mock(base: &str) -> MockSession {
        MockSession::new(Url::parse(base).unwrap()).viewport(64, 48).page_height(100)
    }

    fn pipeline(dir: &TempDir, settings: PipelineSettings) -> ComparisonPipeline {
        let output = RunDirectory::create(dir.path(), Local::now()).unwrap();
        ComparisonPipeline::new(
            settings,
            PixelComparator::new(CompareSettings::default()),
            ScreenshotAssembler::default(),
            output,
        )
    }

    #[tokio::test]
    async fn test_same_pages_write_no_images() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, PipelineSettings::default());
        let mut left = mock("http://left.test/");
        let mut right = mock("http://right.test/");

        let diff = pipeline
            .process_target(&Target::new(0, "/home"), &mut left, &mut right)
            .await
            .unwrap();

        assert!(diff.are_same);
        assert_eq!(diff.left.url.as_deref(), Some("http://left.test/home"));
        assert_eq!(diff.right.url.as_deref(), Some("http://right.test/home"));
        assert_eq!(diff.left.response.status, Some(200));
        assert_eq!(diff.left.img.filename, None);
        assert_eq!(diff.diff_img.size.height, 100);
        assert_eq!(std::fs::read_dir(pipeline.output().img_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_script_target_has_no_url() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, PipelineSettings::default());
        let mut left = mock("http://left.test/");
        let mut right = mock("http://right.test/");
        let target = Target::new(0, "EXEC openMenu()");

        let diff = pipeline.process_target(&target, &mut left, &mut right).await.unwrap();

        assert_eq!(diff.relative, "openMenu()");
        assert_eq!(diff.left.url, None);
        assert!(left.history().iter().any(|op| op == "script openMenu()"));
    }

    #[tokio::test]
    async fn test_on_load_and_wait_run_before_capture() {
        let dir = TempDir::new().unwrap();
        let settings = PipelineSettings {
            on_load: Some("freeze()".into()),
            wait: WaitCondition::Script {
                script: "ready()".into(),
                timeout_ms: 1_000,
                poll_ms: 1,
            },
            ..Default::default()
        };
        let pipeline = pipeline(&dir, settings);
        let mut left = mock("http://left.test/").script_results("ready()", [Value::Bool(false), Value::Bool(true)]);
        let mut right = mock("http://right.test/");

        pipeline
            .process_target(&Target::new(0, "/"), &mut left, &mut right)
            .await
            .unwrap();

        let history = left.history();
        let pos = |op: &str| history.iter().position(|h| h == op).unwrap();
        assert!(pos("navigate http://left.test/") < pos("script freeze()"));
        assert!(pos("script freeze()") < pos("script ready()"));
        assert_eq!(history.iter().filter(|h| *h == "script ready()").count(), 2);
        assert!(pos("script ready()") < pos("capture 0"));
    }

    #[tokio::test]
    async fn test_delay_wait_holds_capture_back() {
        let dir = TempDir::new().unwrap();
        let settings = PipelineSettings {
            wait: WaitCondition::Delay { delay_ms: 30 },
            ..Default::default()
        };
        let pipeline = pipeline(&dir, settings);
        let mut left = mock("http://left.test/");
        let mut right = mock("http://right.test/");

        let started = std::time::Instant::now();
        let diff = pipeline
            .process_target(&Target::new(0, "/"), &mut left, &mut right)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(diff.are_same);
        for history in [left.history(), right.history()] {
            assert!(!history.iter().any(|op| op.starts_with("script")));
            assert_eq!(history.first().map(|op| op.starts_with("navigate")), Some(true));
            assert!(history.iter().any(|op| op == "capture 0"));
        }
    }

    #[tokio::test]
    async fn test_wait_timeout_is_a_capture_failure() {
        let dir = TempDir::new().unwrap();
        let settings = PipelineSettings {
            wait: WaitCondition::Script {
                script: "never()".into(),
                timeout_ms: 20,
                poll_ms: 5,
            },
            ..Default::default()
        };
        let pipeline = pipeline(&dir, settings);
        let mut left = mock("http://left.test/").script_results("never()", [Value::Bool(false)]);
        let mut right = mock("http://right.test/").script_results("never()", [Value::Bool(true)]);

        let err = pipeline
            .process_target(&Target::new(4, "/slow"), &mut left, &mut right)
            .await
            .unwrap_err();

        match err {
            PipelineError::Capture { index, side, source, .. } => {
                assert_eq!(index, 4);
                assert_eq!(side, Side::Left);
                assert!(matches!(source, CaptureError::WaitTimeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_page_timeout_bounds_capture() {
        let dir = TempDir::new().unwrap();
        let settings = PipelineSettings {
            page_timeout: Duration::from_millis(20),
            failure_policy: FailurePolicy::Continue,
            ..Default::default()
        };
        let pipeline = pipeline(&dir, settings);
        let mut left = mock("http://left.test/");
        let mut right = mock("http://right.test/").latency(Duration::from_secs(5));

        let diff = pipeline
            .process_target(&Target::new(0, "/"), &mut left, &mut right)
            .await
            .unwrap();

        assert_eq!(diff.status, crate::report::DiffStatus::Failed);
        assert!(diff.error.unwrap().starts_with("right side"));
    }

    #[tokio::test]
    async fn test_different_pages_are_persisted() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, PipelineSettings::default());
        let mut left = mock("http://left.test/");
        let mut right = mock("http://right.test/").page("/a", MockPage::labelled(64, 120, "changed"));

        let diff = pipeline
            .process_target(&Target::new(2, "/a"), &mut left, &mut right)
            .await
            .unwrap();

        assert!(!diff.are_same);
        assert_eq!(diff.diff_img.size.height, 120);
        assert_eq!(diff.left.img.filename.as_deref(), Some("0002-a-left.png"));
        assert_eq!(diff.diff_img.src.as_deref(), Some("img/0002-a-diff.png"));
        for name in ["0002-a-left.png", "0002-a-right.png", "0002-a-diff.png"] {
            assert!(pipeline.output().img_dir().join(name).is_file(), "{name}");
        }
    }
}
