use serde::{Deserialize, Serialize};

/// One mismatching pixel: `(x, y, indicator)`.
///
/// The indicator is the pixel distance rounded up into `1..=255`; pixels that
/// exist in only one of the two images are 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry(pub u32, pub u32, pub u8);

impl DiffEntry {
    pub fn x(&self) -> u32 {
        self.0
    }

    pub fn y(&self) -> u32 {
        self.1
    }
}

/// Sparse record of the mismatching pixels, in row-major order.
///
/// Serializes as an array of `[x, y, indicator]` triples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffMap(Vec<DiffEntry>);

impl DiffMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries already sorted by `(y, x)`
    pub(crate) fn from_sorted(entries: Vec<DiffEntry>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indicator at `(x, y)`, if that pixel mismatched
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        self.0
            .binary_search_by(|entry| (entry.1, entry.0).cmp(&(y, x)))
            .ok()
            .map(|idx| self.0[idx].2)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiffEntry> {
        self.0.iter()
    }
}
