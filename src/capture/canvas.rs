//! Programmatic page drawing for test fixtures and the mock session.
//!
//! Provides a small drawing API over an RGBA buffer:
//! - `draw_rect()` - Draw a filled rectangle
//! - `draw_text()` - Draw text using font8x8 glyphs
//! - `get_pixel()` - Direct pixel access

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};

/// Opaque white, the background browsers paint outside the document
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Opaque black
pub const BLACK: [u8; 4] = [0, 0, 0, 255];

/// An RGBA page that can be drawn on
#[derive(Debug, Clone, PartialEq)]
pub struct PageCanvas {
    image: RgbaImage,
}

impl PageCanvas {
    /// Create a page with the given dimensions, filled with white
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba(WHITE)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Draw a filled rectangle, clipped to the page
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
        let x_end = x.saturating_add(w).min(self.width());
        let y_end = y.saturating_add(h).min(self.height());
        for py in y..y_end {
            for px in x..x_end {
                self.image.put_pixel(px, py, Rgba(color));
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 4], bg: [u8; 4]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width() {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 4], bg: [u8; 4]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            if py >= self.height() {
                break;
            }
            for bit in 0..8 {
                let px = x + bit;
                if px >= self.width() {
                    break;
                }
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                self.image.put_pixel(px, py, Rgba(color));
            }
        }
    }

    /// Color of a pixel; transparent outside the page
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image
            .get_pixel_checked(x, y)
            .map(|p| p.0)
            .unwrap_or([0, 0, 0, 0])
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_new_is_white() {
        let canvas = PageCanvas::new(100, 50);
        assert_eq!(canvas.width(), 100);
        assert_eq!(canvas.height(), 50);
        assert_eq!(canvas.get_pixel(0, 0), WHITE);
        assert_eq!(canvas.get_pixel(99, 49), WHITE);
        assert_eq!(canvas.get_pixel(100, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_canvas_draw_rect_is_clipped() {
        let mut canvas = PageCanvas::new(20, 20);
        canvas.draw_rect(15, 15, 10, 10, [255, 0, 0, 255]);

        assert_eq!(canvas.get_pixel(14, 14), WHITE);
        assert_eq!(canvas.get_pixel(15, 15), [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(19, 19), [255, 0, 0, 255]);
    }

    #[test]
    fn test_canvas_draw_text() {
        let mut canvas = PageCanvas::new(80, 16);
        canvas.draw_text(0, 0, "Hi", BLACK, WHITE);

        let has_ink = (0..8).any(|y| (0..8).any(|x| canvas.get_pixel(x, y) == BLACK));
        assert!(has_ink, "Character 'H' should have some foreground pixels");
    }
}
