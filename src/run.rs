//! One webdiff invocation from inputs to report bundle.
//!
//! All inputs are loaded and validated before any browser starts, so a bad
//! profile or a missing template is a configuration error, not a runtime one.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::capture::{CaptureSession, SessionLauncher, Side, WebDriverLauncher};
use crate::config;
use crate::cookies::{CookieSpec, load_cookies};
use crate::diff::PixelComparator;
use crate::error::{CaptureError, CaptureResult, ConfigError, ConfigResult, PipelineError, PipelineResult, WebdiffError};
use crate::pipeline::{ComparisonPipeline, FailurePolicy, PipelineSettings};
use crate::profile::Profile;
use crate::report::{ResultsAggregate, RunDirectory};
use crate::target::{Target, read_targets};

/// What the user asked for
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub left: String,
    pub right: String,
    /// Target list; stdin when unset
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub profile: PathBuf,
    pub template: PathBuf,
    pub failure_policy: FailurePolicy,
}

impl RunOptions {
    /// Options with the configured default locations
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        let paths = &config::get().paths;
        Self {
            left: left.into(),
            right: right.into(),
            input: None,
            output: PathBuf::from(&paths.output_dir),
            profile: PathBuf::from(&paths.profile),
            template: PathBuf::from(&paths.template),
            failure_policy: FailurePolicy::Abort,
        }
    }
}

/// Validated inputs of a run
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub left_base: Url,
    pub right_base: Url,
    pub profile: Profile,
    /// Profile as named on the command line, for the report
    pub profile_name: String,
    pub template: PathBuf,
    pub cookies: Vec<CookieSpec>,
    pub targets: Vec<Target>,
}

impl RunInputs {
    /// Load everything the run needs, reading targets from stdin when no input file is given
    pub fn load(options: &RunOptions) -> ConfigResult<Self> {
        let left_base = parse_base_url(&options.left)?;
        let right_base = parse_base_url(&options.right)?;

        let profile_path = config::find_with_optional_ext(&options.profile, "toml").ok_or_else(|| {
            ConfigError::NotFound {
                what: "profile",
                path: options.profile.clone(),
            }
        })?;
        let profile = Profile::load(&profile_path)?;

        let template = config::find_with_optional_ext(&options.template, "html").ok_or_else(|| {
            ConfigError::NotFound {
                what: "template",
                path: options.template.clone(),
            }
        })?;

        let cookies = match profile.cookies_path(&profile_path) {
            Some(path) => load_cookies(&path)?,
            None => Vec::new(),
        };

        let targets = match &options.input {
            Some(path) => read_input_file(path)?,
            None => read_targets(std::io::stdin().lock()).map_err(|source| ConfigError::Read {
                what: "input",
                path: PathBuf::from("<stdin>"),
                source,
            })?,
        };
        debug!(targets = targets.len(), cookies = cookies.len(), "Loaded inputs");

        Ok(Self {
            left_base,
            right_base,
            profile,
            profile_name: options.profile.display().to_string(),
            template,
            cookies,
            targets,
        })
    }
}

fn parse_base_url(input: &str) -> ConfigResult<Url> {
    Url::parse(input).map_err(|source| ConfigError::BaseUrl {
        input: input.to_string(),
        source,
    })
}

fn read_input_file(path: &Path) -> ConfigResult<Vec<Target>> {
    let read_error = |source: std::io::Error| ConfigError::Read {
        what: "input file",
        path: path.to_path_buf(),
        source,
    };
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            what: "input file",
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(read_error)?;
    read_targets(BufReader::new(file)).map_err(read_error)
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub results: ResultsAggregate,
}

impl RunReport {
    /// Targets that did not compare as the same
    pub fn mismatches(&self) -> usize {
        self.results.mismatch_count()
    }
}

/// Run against real browsers over WebDriver
pub async fn run(options: &RunOptions, cancel: CancellationToken) -> Result<RunReport, WebdiffError> {
    let inputs = RunInputs::load(options)?;
    let launcher = WebDriverLauncher::new(inputs.profile.driver.clone(), inputs.profile.window.clone());
    run_with_launcher(inputs, &options.output, options.failure_policy, &launcher, cancel).await
}

/// Run with sessions from `launcher`.
///
/// Session start, cookie installation and closing are bounded by the
/// profile's page timeout; start and cookies also stop when `cancel` fires.
pub async fn run_with_launcher(
    inputs: RunInputs,
    output: &Path,
    failure_policy: FailurePolicy,
    launcher: &dyn SessionLauncher,
    cancel: CancellationToken,
) -> Result<RunReport, WebdiffError> {
    let started = Local::now();
    let limit = inputs.profile.capture.page_timeout();

    let (mut left, mut right) =
        start_sessions(launcher, &inputs.left_base, &inputs.right_base, limit, &cancel).await?;

    let outcome = match RunDirectory::create(output, started) {
        Ok(run_dir) => {
            compare_all(&inputs, run_dir, failure_policy, &cancel, started, left.as_mut(), right.as_mut()).await
        }
        Err(e) => Err(e),
    };

    dispose(left.as_mut(), Side::Left, limit).await;
    dispose(right.as_mut(), Side::Right, limit).await;

    let (run_dir, mut results) = outcome?;
    results.finish(Local::now());
    run_dir.write_report(&inputs.template, &results)?;

    match results.mismatch_count() {
        0 => info!("ALL SAME"),
        n => warn!("DIFFERS ({})", n),
    }

    Ok(RunReport {
        run_dir: run_dir.root().to_path_buf(),
        results,
    })
}

async fn compare_all(
    inputs: &RunInputs,
    run_dir: RunDirectory,
    failure_policy: FailurePolicy,
    cancel: &CancellationToken,
    started: chrono::DateTime<Local>,
    left: &mut dyn CaptureSession,
    right: &mut dyn CaptureSession,
) -> Result<(RunDirectory, ResultsAggregate), PipelineError> {
    let profile = &inputs.profile;
    let limit = profile.capture.page_timeout();
    install_cookies(&inputs.cookies, left, Side::Left, limit, cancel).await?;
    install_cookies(&inputs.cookies, right, Side::Right, limit, cancel).await?;

    let pipeline = ComparisonPipeline::new(
        PipelineSettings::from_profile(profile, failure_policy),
        PixelComparator::new(profile.compare.clone()),
        profile.capture.assembler(),
        run_dir,
    )
    .with_cancellation(cancel.clone());

    let mut results = ResultsAggregate::new(
        started,
        inputs.left_base.as_str(),
        inputs.right_base.as_str(),
        &inputs.profile_name,
    );
    pipeline.run(&inputs.targets, left, right, &mut results).await?;
    Ok((pipeline.output().clone(), results))
}

/// `operation` bounded by `limit`; `None` when `cancel` fires first
async fn bounded<T>(
    operation: impl Future<Output = CaptureResult<T>>,
    name: &'static str,
    limit: Duration,
    cancel: &CancellationToken,
) -> Option<CaptureResult<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        done = tokio::time::timeout(limit, operation) => Some(done.unwrap_or_else(|_| {
            Err(CaptureError::Timeout {
                operation: name,
                limit,
            })
        })),
    }
}

async fn start_side(
    launcher: &dyn SessionLauncher,
    side: Side,
    base_url: &Url,
    limit: Duration,
    cancel: &CancellationToken,
) -> PipelineResult<Box<dyn CaptureSession>> {
    match bounded(launcher.launch(side, base_url), "session start", limit, cancel).await {
        None => Err(PipelineError::Cancelled),
        Some(started) => started.map_err(|source| PipelineError::SessionStart { side, source }),
    }
}

/// Start both sessions at once; a session that started is closed again if the other did not
async fn start_sessions(
    launcher: &dyn SessionLauncher,
    left_base: &Url,
    right_base: &Url,
    limit: Duration,
    cancel: &CancellationToken,
) -> PipelineResult<(Box<dyn CaptureSession>, Box<dyn CaptureSession>)> {
    let (left, right) = tokio::join!(
        start_side(launcher, Side::Left, left_base, limit, cancel),
        start_side(launcher, Side::Right, right_base, limit, cancel)
    );
    match (left, right) {
        (Ok(left), Ok(right)) => Ok((left, right)),
        (Err(e), right) => {
            if let Ok(mut right) = right {
                dispose(right.as_mut(), Side::Right, limit).await;
            }
            Err(e)
        }
        (Ok(mut left), Err(e)) => {
            dispose(left.as_mut(), Side::Left, limit).await;
            Err(e)
        }
    }
}

async fn install_cookies(
    cookies: &[CookieSpec],
    session: &mut dyn CaptureSession,
    side: Side,
    limit: Duration,
    cancel: &CancellationToken,
) -> PipelineResult<()> {
    for cookie in cookies {
        match bounded(session.add_cookie(cookie), "adding a cookie", limit, cancel).await {
            None => return Err(PipelineError::Cancelled),
            Some(added) => added.map_err(|source| PipelineError::Cookies { side, source })?,
        }
    }
    Ok(())
}

async fn dispose(session: &mut dyn CaptureSession, side: Side, limit: Duration) {
    match tokio::time::timeout(limit, session.dispose()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%side, "Failed to close session: {}", e),
        Err(_) => warn!(%side, "Session did not close within {:?}", limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn options(dir: &Path) -> RunOptions {
        RunOptions {
            left: "http://left.test/".into(),
            right: "http://right.test/".into(),
            input: Some(write(dir, "urls.txt", "/\n# skip\n/about\n")),
            output: dir.join("out"),
            profile: write(dir, "profile.toml", "[driver]\ncookies = \"cookies.txt\"\n"),
            template: write(dir, "template.html", "<html></html>"),
            failure_policy: FailurePolicy::Abort,
        }
    }

    #[test]
    fn test_load_inputs() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "cookies.txt", "sid=1; Path=/\n");
        let inputs = RunInputs::load(&options(tmp.path())).unwrap();

        assert_eq!(inputs.left_base.as_str(), "http://left.test/");
        assert_eq!(inputs.targets.len(), 2);
        assert_eq!(inputs.targets[1].text(), "/about");
        assert_eq!(inputs.cookies[0].name, "sid");
    }

    #[test]
    fn test_profile_found_without_extension() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "cookies.txt", "");
        let mut options = options(tmp.path());
        options.profile = tmp.path().join("profile");
        options.template = tmp.path().join("template");

        let inputs = RunInputs::load(&options).unwrap();
        assert!(inputs.cookies.is_empty());
        assert!(inputs.template.ends_with("template.html"));
    }

    #[test]
    fn test_config_errors() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "cookies.txt", "");

        let mut bad_url = options(tmp.path());
        bad_url.left = "not a url".into();
        assert!(matches!(RunInputs::load(&bad_url), Err(ConfigError::BaseUrl { .. })));

        let mut no_template = options(tmp.path());
        no_template.template = tmp.path().join("missing.html");
        assert!(matches!(
            RunInputs::load(&no_template),
            Err(ConfigError::NotFound { what: "template", .. })
        ));

        let mut no_input = options(tmp.path());
        no_input.input = Some(tmp.path().join("missing.txt"));
        assert!(matches!(
            RunInputs::load(&no_input),
            Err(ConfigError::NotFound { what: "input file", .. })
        ));

        fs::remove_file(tmp.path().join("cookies.txt")).unwrap();
        assert!(matches!(
            RunInputs::load(&options(tmp.path())),
            Err(ConfigError::NotFound { what: "cookie file", .. })
        ));
    }
}
