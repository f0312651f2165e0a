//! Pixel-level comparison of two page captures.

use image::RgbaImage;
use rayon::prelude::*;

use super::map::{DiffEntry, DiffMap};
use super::settings::CompareSettings;

/// Indicator of a pixel that exists in only one image
const OUT_OF_BOUNDS_INDICATOR: u8 = 255;

/// Output of [`PixelComparator::compare`]
#[derive(Debug, Clone)]
pub struct DiffResult {
    pub unmatched: u64,
    pub map: DiffMap,
    /// Diff rendering: faded left image with mismatches highlighted
    pub image: RgbaImage,
    pub are_same: bool,
}

impl DiffResult {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn total_pixels(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Share of matching pixels, `1.0` for an empty canvas
    pub fn match_ratio(&self) -> f64 {
        match self.total_pixels() {
            0 => 1.0,
            total => 1.0 - self.unmatched as f64 / total as f64,
        }
    }
}

/// Compares images under one set of [`CompareSettings`]
#[derive(Debug, Clone, Default)]
pub struct PixelComparator {
    settings: CompareSettings,
}

impl PixelComparator {
    pub fn new(settings: CompareSettings) -> Self {
        Self { settings }
    }

    /// Compare `left` against `right`.
    ///
    /// The canvas is as wide and as tall as the larger of the two inputs.
    /// Pixels present in only one input are always unmatched.
    pub fn compare(&self, left: &RgbaImage, right: &RgbaImage) -> DiffResult {
        let width = left.width().max(right.width());
        let height = left.height().max(right.height());
        let mut image = RgbaImage::new(width, height);

        let mut entries = Vec::new();
        if width > 0 && height > 0 {
            let row_bytes = width as usize * 4;
            let rows: Vec<Vec<DiffEntry>> = image
                .par_chunks_mut(row_bytes)
                .enumerate()
                .map(|(y, row)| self.compare_row(left, right, y as u32, row))
                .collect();
            entries = rows.into_iter().flatten().collect();
        }

        let unmatched = entries.len() as u64;
        let map = DiffMap::from_sorted(entries);
        let are_same = unmatched <= self.settings.pixels_threshold || map.is_empty();

        DiffResult {
            unmatched,
            map,
            image,
            are_same,
        }
    }

    fn compare_row(&self, left: &RgbaImage, right: &RgbaImage, y: u32, row: &mut [u8]) -> Vec<DiffEntry> {
        let mut entries = Vec::new();
        for (x, out) in row.chunks_exact_mut(4).enumerate() {
            let x = x as u32;
            let (pixel, entry) = match (pixel_at(left, x, y), pixel_at(right, x, y)) {
                (Some(a), Some(b)) => {
                    let distance = self.settings.metric.distance(a, b);
                    if distance <= self.settings.tolerance {
                        (faded(a), None)
                    } else {
                        let indicator = distance.ceil().clamp(1.0, 255.0) as u8;
                        (self.settings.highlight, Some(DiffEntry(x, y, indicator)))
                    }
                }
                _ => (
                    self.settings.highlight,
                    Some(DiffEntry(x, y, OUT_OF_BOUNDS_INDICATOR)),
                ),
            };
            out.copy_from_slice(&pixel);
            entries.extend(entry);
        }
        entries
    }
}

fn pixel_at(image: &RgbaImage, x: u32, y: u32) -> Option<[u8; 4]> {
    (x < image.width() && y < image.height()).then(|| image.get_pixel(x, y).0)
}

/// Light grey version of a matched pixel
fn faded(pixel: [u8; 4]) -> [u8; 4] {
    let [r, g, b, _] = pixel;
    let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000;
    let light = (255 - (255 - luma) / 4) as u8;
    [light, light, light, 255]
}

/// One-off comparison without keeping a comparator around
pub fn compare(left: &RgbaImage, right: &RgbaImage, settings: &CompareSettings) -> DiffResult {
    PixelComparator::new(settings.clone()).compare(left, right)
}
