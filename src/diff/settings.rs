use serde::{Deserialize, Serialize};

/// Highlight colour for unmatched pixels unless a profile overrides it
pub const DEFAULT_HIGHLIGHT: [u8; 4] = [255, 0, 0, 255];

/// How the distance between two pixels is measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Largest absolute difference of any RGBA channel
    #[default]
    PerChannel,
    /// Euclidean distance over RGBA
    Euclidean,
}

impl DistanceMetric {
    pub fn distance(self, a: [u8; 4], b: [u8; 4]) -> f64 {
        match self {
            DistanceMetric::PerChannel => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.abs_diff(*y))
                .max()
                .map(f64::from)
                .unwrap_or(0.0),
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = f64::from(x.abs_diff(*y));
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

/// Tolerances of one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSettings {
    /// Unmatched pixels a pair may have and still count as the same
    pub pixels_threshold: u64,
    /// Largest distance at which two pixels still match
    pub tolerance: f64,
    pub metric: DistanceMetric,
    /// RGBA colour of unmatched pixels in the diff image
    pub highlight: [u8; 4],
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            pixels_threshold: 0,
            tolerance: 0.0,
            metric: DistanceMetric::PerChannel,
            highlight: DEFAULT_HIGHLIGHT,
        }
    }
}
