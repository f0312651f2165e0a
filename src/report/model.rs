//! Report data model.
//!
//! Serialized once at the end of a run into `results.js`, where the HTML
//! viewer reads it. Keys are PascalCase to match what the viewer expects.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::capture::HttpResponse;
use crate::diff::{DiffMap, DiffResult};
use crate::target::Target;

/// Directory of the images, relative to the report
pub const IMG_DIR: &str = "img";

/// Outcome of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffStatus {
    Same,
    Different,
    /// Capture failed and the run went on
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImgSize {
    pub width: u32,
    pub height: u32,
}

/// Image reference; `filename` and `src` stay unset when nothing was saved
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Img {
    pub filename: Option<String>,
    pub src: Option<String>,
    pub size: ImgSize,
}

impl Img {
    /// An image that was compared but not written
    pub fn unsaved(width: u32, height: u32) -> Self {
        Self {
            filename: None,
            src: None,
            size: ImgSize { width, height },
        }
    }

    /// An image written to `img/<filename>`
    pub fn saved(filename: &str, width: u32, height: u32) -> Self {
        let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
        Self {
            filename: Some(filename.to_string()),
            src: Some(format!("{}/{}", IMG_DIR, encoded)),
            size: ImgSize { width, height },
        }
    }
}

/// One side of a compared target
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page {
    /// Navigated URL; unset for script targets
    pub url: Option<String>,
    pub response: HttpResponse,
    pub img: Img,
}

/// Report record of one target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Diff {
    pub relative: String,
    pub are_same: bool,
    pub status: DiffStatus,
    pub error: Option<String>,
    pub unmatched_pixels: u64,
    pub total_pixels: u64,
    #[serde(rename = "Match")]
    pub match_ratio: f64,
    pub left: Page,
    pub right: Page,
    pub diff_img: Img,
    pub diff_map: DiffMap,
}

impl Diff {
    /// Record a finished comparison; the pages carry their image references
    pub fn compared(target: &Target, left: Page, right: Page, diff_img: Img, result: DiffResult) -> Self {
        let status = if result.are_same {
            DiffStatus::Same
        } else {
            DiffStatus::Different
        };
        Self {
            relative: target.text().to_string(),
            are_same: result.are_same,
            status,
            error: None,
            unmatched_pixels: result.unmatched,
            total_pixels: result.total_pixels(),
            match_ratio: result.match_ratio(),
            left,
            right,
            diff_img,
            diff_map: result.map,
        }
    }

    /// Record a target whose capture failed
    pub fn failed(target: &Target, left: Page, right: Page, error: String) -> Self {
        Self {
            relative: target.text().to_string(),
            are_same: false,
            status: DiffStatus::Failed,
            error: Some(error),
            unmatched_pixels: 0,
            total_pixels: 0,
            match_ratio: 0.0,
            left,
            right,
            diff_img: Img::default(),
            diff_map: DiffMap::new(),
        }
    }
}

/// Totals and records of a whole run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultsAggregate {
    pub started: DateTime<Local>,
    pub ended: Option<DateTime<Local>>,
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
    pub left_base: String,
    pub right_base: String,
    pub profile: String,
    pub total_count: usize,
    pub same_count: usize,
    pub diff_count: usize,
    pub failed_count: usize,
    pub diffs: Vec<Diff>,
}

impl ResultsAggregate {
    pub fn new(started: DateTime<Local>, left_base: &str, right_base: &str, profile: &str) -> Self {
        Self {
            started,
            ended: None,
            elapsed: Duration::ZERO,
            left_base: left_base.to_string(),
            right_base: right_base.to_string(),
            profile: profile.to_string(),
            total_count: 0,
            same_count: 0,
            diff_count: 0,
            failed_count: 0,
            diffs: Vec::new(),
        }
    }

    /// Append a record and update the totals
    pub fn record(&mut self, diff: Diff) {
        self.total_count += 1;
        match diff.status {
            DiffStatus::Same => self.same_count += 1,
            DiffStatus::Different => self.diff_count += 1,
            DiffStatus::Failed => self.failed_count += 1,
        }
        self.diffs.push(diff);
    }

    /// Stamp the end time
    pub fn finish(&mut self, ended: DateTime<Local>) {
        self.elapsed = (ended - self.started).to_std().unwrap_or_default();
        self.ended = Some(ended);
    }

    /// Targets that did not compare as the same
    pub fn mismatch_count(&self) -> usize {
        self.diff_count + self.failed_count
    }

    pub fn is_finished(&self) -> bool {
        self.ended.is_some()
    }
}

/// `HH:MM:SS.fffffff`, hours not wrapping at a day
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:07}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60,
        elapsed.subsec_nanos() / 100
    )
}

fn serialize_elapsed<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_elapsed(*elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::PixelComparator;
    use chrono::TimeZone;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00.0000000");
        assert_eq!(
            format_elapsed(Duration::new(3 * 3600 + 25 * 60 + 7, 123_456_700)),
            "03:25:07.1234567"
        );
        assert_eq!(format_elapsed(Duration::from_secs(26 * 3600)), "26:00:00.0000000");
    }

    #[test]
    fn test_img_src_is_url_encoded() {
        let img = Img::saved("0001-a b+c-left.png", 10, 20);
        assert_eq!(img.src.as_deref(), Some("img/0001-a+b%2Bc-left.png"));
        assert_eq!(img.size, ImgSize { width: 10, height: 20 });
    }

    #[test]
    fn test_record_updates_totals() {
        let mut results = ResultsAggregate::new(started(), "http://l/", "http://r/", "profile.toml");
        let white = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let black = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let comparator = PixelComparator::default();

        let same = comparator.compare(&white, &white);
        results.record(Diff::compared(&Target::new(0, "/"), Page::default(), Page::default(), Img::unsaved(2, 2), same));
        let differs = comparator.compare(&white, &black);
        results.record(Diff::compared(&Target::new(1, "/b"), Page::default(), Page::default(), Img::unsaved(2, 2), differs));
        results.record(Diff::failed(&Target::new(2, "/c"), Page::default(), Page::default(), "boom".into()));

        assert_eq!(results.total_count, 3);
        assert_eq!(results.same_count, 1);
        assert_eq!(results.diff_count, 1);
        assert_eq!(results.failed_count, 1);
        assert_eq!(results.mismatch_count(), 2);
        assert_eq!(results.diffs[1].unmatched_pixels, 4);
        assert_eq!(results.diffs[1].match_ratio, 0.0);
    }

    #[test]
    fn test_serialized_keys() {
        let mut results = ResultsAggregate::new(started(), "http://l/", "http://r/", "p.toml");
        let img = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255]));
        let page = Page {
            url: Some("http://l/x".into()),
            response: HttpResponse {
                status: Some(200),
                ..Default::default()
            },
            img: Img::unsaved(1, 1),
        };
        let result = PixelComparator::default().compare(&img, &img);
        results.record(Diff::compared(&Target::new(0, "/x"), page.clone(), page, Img::unsaved(1, 1), result));
        results.finish(started() + chrono::Duration::milliseconds(1500));

        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["Elapsed"], json!("00:00:01.5000000"));
        assert_eq!(value["TotalCount"], json!(1));
        assert_eq!(value["LeftBase"], json!("http://l/"));

        let diff = &value["Diffs"][0];
        assert_eq!(diff["Relative"], json!("/x"));
        assert_eq!(diff["AreSame"], json!(true));
        assert_eq!(diff["Status"], json!("Same"));
        assert_eq!(diff["Match"], json!(1.0));
        assert_eq!(diff["DiffMap"], json!([]));
        assert_eq!(diff["Left"]["Response"]["Status"], json!(200));
        assert_eq!(diff["Left"]["Img"]["Filename"], json!(null));
        assert_eq!(diff["DiffImg"]["Size"], json!({ "Width": 1, "Height": 1 }));
    }
}
