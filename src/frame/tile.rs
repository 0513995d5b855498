//! Tiles: rectangular pixel updates from the rendering surface

use super::convert::SourceOrder;
use crate::constants::STRIDE_SURFACE;

/// Rectangle in panel pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True if `other` lies entirely inside this rectangle
    pub fn covers(&self, other: &Rect) -> bool {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        self.x <= other.x
            && self.y <= other.y
            && right >= u64::from(other.x) + u64::from(other.width)
            && bottom >= u64::from(other.y) + u64::from(other.height)
    }

    /// Visible extent (columns, rows) of this rectangle inside a
    /// `panel_width` x `panel_height` area anchored at the origin.
    ///
    /// Rectangles starting past the panel edge yield zero.
    pub fn clipped_extent(&self, panel_width: u32, panel_height: u32) -> (u32, u32) {
        let columns = self.width.min(panel_width.saturating_sub(self.x));
        let rows = self.height.min(panel_height.saturating_sub(self.y));
        (columns, rows)
    }
}

/// A rectangular update in the surface's 4-byte pixel format
#[derive(Debug, Clone)]
pub struct Tile {
    /// Where the tile lands on the panel
    pub rect: Rect,
    /// Channel order of `pixels`
    pub order: SourceOrder,
    /// Row-major pixels, `rect.width * 4` bytes per row
    pub pixels: Vec<u8>,
}

impl Tile {
    pub fn new(rect: Rect, order: SourceOrder, pixels: Vec<u8>) -> Self {
        Self {
            rect,
            order,
            pixels,
        }
    }

    /// Bytes per source row
    #[inline]
    pub fn stride(&self) -> usize {
        self.rect.width as usize * STRIDE_SURFACE
    }

    /// Number of complete rows actually present in `pixels`
    pub fn available_rows(&self) -> u32 {
        match self.stride() {
            0 => 0,
            stride => (self.pixels.len() / stride).min(u32::MAX as usize) as u32,
        }
    }

    /// Source bytes of row `row`, or `None` if the buffer is short
    pub fn row(&self, row: u32) -> Option<&[u8]> {
        let stride = self.stride();
        let start = row as usize * stride;
        self.pixels.get(start..start + stride)
    }
}
