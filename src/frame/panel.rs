//! Panel geometry
//!
//! The deck's keys form a grid of square cells; the panel is the whole
//! grid treated as one image.

use super::tile::Rect;
use crate::constants::STRIDE_DECK;

/// Key grid dimensions of a connected deck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    /// Number of key rows
    pub rows: u32,
    /// Number of key columns
    pub columns: u32,
    /// Edge length of one key in pixels
    pub cell_size: u32,
}

impl Panel {
    pub const fn new(rows: u32, columns: u32, cell_size: u32) -> Self {
        Self {
            rows,
            columns,
            cell_size,
        }
    }

    /// Panel width in pixels
    #[inline]
    pub const fn width(&self) -> u32 {
        self.columns * self.cell_size
    }

    /// Panel height in pixels
    #[inline]
    pub const fn height(&self) -> u32 {
        self.rows * self.cell_size
    }

    /// Number of keys
    #[inline]
    pub const fn key_count(&self) -> u32 {
        self.rows * self.columns
    }

    /// Framebuffer size in bytes (RGB)
    #[inline]
    pub const fn frame_len(&self) -> usize {
        self.width() as usize * self.height() as usize * STRIDE_DECK
    }

    /// Rectangle covering the whole panel
    pub const fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    /// True when both panels need the same framebuffer layout
    pub const fn same_dimensions(&self, other: &Panel) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }
}

impl std::fmt::Display for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} keys @ {}px ({}x{})",
            self.columns,
            self.rows,
            self.cell_size,
            self.width(),
            self.height()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let panel = Panel::new(3, 5, 72);
        assert_eq!(panel.width(), 360);
        assert_eq!(panel.height(), 216);
        assert_eq!(panel.key_count(), 15);
        assert_eq!(panel.frame_len(), 360 * 216 * 3);
        assert_eq!(panel.full_rect(), Rect::new(0, 0, 360, 216));
    }

    #[test]
    fn test_same_dimensions() {
        // 4x8 @ 96 and 8x16 @ 48 produce the same pixel area
        assert!(Panel::new(4, 8, 96).same_dimensions(&Panel::new(8, 16, 48)));
        assert!(!Panel::new(3, 5, 72).same_dimensions(&Panel::new(4, 8, 96)));
    }
}
