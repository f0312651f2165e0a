//! Run directory layout and report bundle writing.
//!
//! ```text
//! <output>/<yyyyMMdd-HHmmss>/
//!   index.html      copy of the template
//!   results.js      render(<results json>);
//!   img/            left/right/diff PNGs of targets that differ
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::RgbaImage;
use tracing::{debug, info};

use super::model::{IMG_DIR, ResultsAggregate};
use crate::error::{PipelineError, PipelineResult};

/// Report file copied from the template
pub const REPORT_FILENAME: &str = "index.html";

/// Data file loaded by the report
pub const RESULTS_FILENAME: &str = "results.js";

/// Function in the template that receives the results
pub const RENDER_FUNCTION: &str = "render";

/// Longest sanitized target text kept in artifact names
const MAX_STEM_CHARS: usize = 80;

/// File names of the three images of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub left: String,
    pub right: String,
    pub diff: String,
}

impl ArtifactNames {
    /// `<4-digit index>-<sanitized text>-{left,right,diff}.png`
    pub fn for_target(index: usize, text: &str) -> Self {
        let stem = format!("{:04}-{}", index, sanitize_name(text.trim_matches('/')));
        Self {
            left: format!("{}-left.png", stem),
            right: format!("{}-right.png", stem),
            diff: format!("{}-diff.png", stem),
        }
    }
}

/// Make a target's text safe for use in file names
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .take(MAX_STEM_CHARS)
        .collect();
    if sanitized.is_empty() {
        "index".to_string()
    } else {
        sanitized
    }
}

/// The directory of one run
#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
    img_dir: PathBuf,
}

impl RunDirectory {
    /// Create `<output>/<yyyyMMdd-HHmmss>/img/`; fails if the run directory exists
    pub fn create(output: &Path, started: DateTime<Local>) -> PipelineResult<Self> {
        let root = output.join(started.format("%Y%m%d-%H%M%S").to_string());
        fs::create_dir_all(output).map_err(|source| PipelineError::Artifact {
            path: output.to_path_buf(),
            source,
        })?;
        fs::create_dir(&root).map_err(|source| PipelineError::Artifact {
            path: root.clone(),
            source,
        })?;

        let img_dir = root.join(IMG_DIR);
        fs::create_dir(&img_dir).map_err(|source| PipelineError::Artifact {
            path: img_dir.clone(),
            source,
        })?;

        debug!(dir = %root.display(), "Created run directory");
        Ok(Self { root, img_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn img_dir(&self) -> &Path {
        &self.img_dir
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILENAME)
    }

    pub fn results_path(&self) -> PathBuf {
        self.root.join(RESULTS_FILENAME)
    }

    /// Write `image` as `img/<filename>`
    pub fn save_image(&self, filename: &str, image: &RgbaImage) -> PipelineResult<PathBuf> {
        let path = self.img_dir.join(filename);
        image.save(&path).map_err(|source| PipelineError::ArtifactImage {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Copy the template and write the results data file next to it
    pub fn write_report(&self, template: &Path, results: &ResultsAggregate) -> PipelineResult<()> {
        let report = self.report_path();
        fs::copy(template, &report).map_err(|source| PipelineError::Artifact {
            path: report.clone(),
            source,
        })?;

        let data = render_results(results)?;
        let results_path = self.results_path();
        fs::write(&results_path, data).map_err(|source| PipelineError::Artifact {
            path: results_path.clone(),
            source,
        })?;

        info!(report = %report.display(), "Report written");
        Ok(())
    }
}

/// Contents of `results.js`
pub fn render_results(results: &ResultsAggregate) -> PipelineResult<String> {
    let json = serde_json::to_string_pretty(results)?;
    Ok(format!("{}({});\n", RENDER_FUNCTION, json))
}
