pub mod model;
pub mod output;

pub use model::{Diff, DiffStatus, Img, ImgSize, Page, ResultsAggregate, format_elapsed};
pub use output::{ArtifactNames, RunDirectory, render_results, sanitize_name};
