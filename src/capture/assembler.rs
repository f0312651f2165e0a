//! Full-page screenshots by scrolling one viewport at a time.

use std::time::Duration;

use image::{RgbaImage, imageops};
use tracing::{debug, warn};

use super::session::CaptureSession;
use crate::error::CaptureResult;

/// Default cap on scroll steps per page
pub const DEFAULT_MAX_SCROLLS: u32 = 50;

/// One captured viewport and the rows of it that are new
struct Segment {
    image: RgbaImage,
    /// First row of `image` that was not already captured
    offset: u32,
    height: u32,
}

/// Stitches viewport captures into an image of the whole scrollable page.
///
/// The session is left scrolled to wherever capturing stopped.
#[derive(Debug, Clone)]
pub struct ScreenshotAssembler {
    max_scrolls: u32,
    settle: Duration,
}

impl Default for ScreenshotAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCROLLS, Duration::ZERO)
    }
}

impl ScreenshotAssembler {
    /// `max_scrolls` bounds pages that keep growing; `settle` is slept after each scroll
    pub fn new(max_scrolls: u32, settle: Duration) -> Self {
        Self { max_scrolls, settle }
    }

    pub fn max_scrolls(&self) -> u32 {
        self.max_scrolls
    }

    /// Capture the page below the current scroll position down to its bottom
    pub async fn capture<S>(&self, session: &mut S) -> CaptureResult<RgbaImage>
    where
        S: CaptureSession + ?Sized,
    {
        let mut position = session.scroll_by(0).await?;
        let first = session.capture_viewport().await?;
        let viewport_height = first.height();
        let mut segments = vec![Segment {
            height: viewport_height,
            offset: 0,
            image: first,
        }];

        let mut scrolls = 0;
        while viewport_height > 0 {
            if scrolls >= self.max_scrolls {
                warn!(
                    max_scrolls = self.max_scrolls,
                    "Page still scrolling after the scroll limit, keeping what was captured"
                );
                break;
            }
            scrolls += 1;

            let next = session.scroll_by(viewport_height).await?;
            let advanced = next.saturating_sub(position);
            if advanced == 0 {
                break;
            }
            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }

            let image = session.capture_viewport().await?;
            let height = advanced.min(viewport_height).min(image.height());
            segments.push(Segment {
                offset: image.height() - height,
                height,
                image,
            });
            position = next;

            if advanced < viewport_height {
                break;
            }
        }

        debug!(segments = segments.len(), "Stitching page");
        Ok(stitch(&segments))
    }
}

fn stitch(segments: &[Segment]) -> RgbaImage {
    let width = segments.first().map(|s| s.image.width()).unwrap_or(0);
    let height = segments.iter().map(|s| s.height).sum();
    let mut page = RgbaImage::new(width, height);

    let mut y = 0i64;
    for segment in segments {
        let cols = segment.image.width().min(width);
        let rows = imageops::crop_imm(&segment.image, 0, segment.offset, cols, segment.height).to_image();
        imageops::replace(&mut page, &rows, 0, y);
        y += i64::from(segment.height);
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::canvas::PageCanvas;
    use crate::capture::mock::{MockPage, MockSession};
    use url::Url;

    fn striped_page(width: u32, height: u32) -> RgbaImage {
        let mut canvas = PageCanvas::new(width, height);
        for y in 0..height {
            let shade = (y % 251) as u8;
            canvas.draw_rect(0, y, width, 1, [shade, 255 - shade, (y / 251) as u8, 255]);
        }
        canvas.into_image()
    }

    async fn session_on(page: RgbaImage, viewport: (u32, u32)) -> MockSession {
        let base = Url::parse("http://site.test/").unwrap();
        let mut session = MockSession::new(base.clone())
            .viewport(viewport.0, viewport.1)
            .page("/page", MockPage::new(page));
        session.navigate(&base.join("/page").unwrap()).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_stitches_whole_page_with_partial_last_segment() {
        let page = striped_page(40, 250);
        let mut session = session_on(page.clone(), (40, 100)).await;

        let stitched = ScreenshotAssembler::default().capture(&mut session).await.unwrap();

        assert_eq!(stitched.dimensions(), (40, 250));
        assert_eq!(stitched, page);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_viewport() {
        let page = striped_page(40, 300);
        let mut session = session_on(page.clone(), (40, 100)).await;

        let stitched = ScreenshotAssembler::default().capture(&mut session).await.unwrap();

        assert_eq!(stitched, page);
    }

    #[tokio::test]
    async fn test_short_page_is_one_viewport() {
        let page = striped_page(40, 60);
        let mut session = session_on(page, (40, 100)).await;

        let stitched = ScreenshotAssembler::default().capture(&mut session).await.unwrap();

        assert_eq!(stitched.dimensions(), (40, 100));
    }

    #[tokio::test]
    async fn test_scroll_limit_bounds_capture() {
        let page = striped_page(40, 10_000);
        let mut session = session_on(page.clone(), (40, 100)).await;

        let stitched = ScreenshotAssembler::new(2, Duration::ZERO)
            .capture(&mut session)
            .await
            .unwrap();

        assert_eq!(stitched.dimensions(), (40, 300));
        assert_eq!(stitched, imageops::crop_imm(&page, 0, 0, 40, 300).to_image());
    }

    #[tokio::test]
    async fn test_settle_delay_after_each_scroll() {
        let page = striped_page(40, 250);
        let mut session = session_on(page.clone(), (40, 100)).await;
        let settle = Duration::from_millis(15);

        let started = std::time::Instant::now();
        let stitched = ScreenshotAssembler::new(DEFAULT_MAX_SCROLLS, settle)
            .capture(&mut session)
            .await
            .unwrap();

        // Two scrolls advance the page, each followed by a settle
        assert!(started.elapsed() >= settle * 2);
        assert_eq!(stitched, page);
        let captures: Vec<_> = session
            .history()
            .into_iter()
            .filter(|op| op.starts_with("capture"))
            .collect();
        assert_eq!(captures, vec!["capture 0", "capture 100", "capture 150"]);
    }

    #[tokio::test]
    async fn test_capture_failure_aborts() {
        let base = Url::parse("http://site.test/").unwrap();
        let mut session = MockSession::new(base.clone()).failing("/broken");
        session.navigate(&base.join("/broken").unwrap()).await.unwrap();

        assert!(ScreenshotAssembler::default().capture(&mut session).await.is_err());
    }
}
