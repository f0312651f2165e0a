pub mod comparator;
pub mod map;
pub mod settings;

pub use comparator::{DiffResult, PixelComparator, compare};
pub use map::{DiffEntry, DiffMap};
pub use settings::{CompareSettings, DEFAULT_HIGHLIGHT, DistanceMetric};
