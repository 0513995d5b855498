//! Frame compositor
//!
//! Owns the full-panel framebuffer in the deck's RGB format and applies
//! surface tiles to it. The deck can only replace the whole panel per
//! write, so the caller always pushes [`FrameCompositor::frame`] after
//! applying a tile.
//!
//! After every rebuild the compositor waits for a full-panel capture;
//! dirty tiles that arrive earlier are dropped so that no region of a
//! freshly allocated framebuffer is pushed unwritten.

use log::{debug, info};

use super::convert::convert_row;
use super::panel::Panel;
use super::tile::Tile;
use crate::constants::STRIDE_DECK;

/// Result of applying one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Pixels were written; the framebuffer should be pushed
    Applied { columns: u32, rows: u32 },
    /// The tile lies entirely outside the panel (nothing written)
    Clipped,
    /// Dropped because the full capture after a rebuild has not arrived yet
    Deferred,
}

impl ApplyOutcome {
    pub fn needs_push(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Persistent full-panel framebuffer
pub struct FrameCompositor {
    panel: Panel,
    frame: Vec<u8>,
    awaiting_full: bool,
    /// Dirty tiles dropped while awaiting the full capture
    deferred: u64,
}

impl FrameCompositor {
    /// Allocate a zeroed framebuffer for `panel`
    pub fn new(panel: Panel) -> Self {
        Self {
            panel,
            frame: vec![0; panel.frame_len()],
            awaiting_full: true,
            deferred: 0,
        }
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    /// Current framebuffer contents (RGB, row-major)
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// True until a full capture has been applied since the last rebuild
    #[cfg(test)]
    pub fn awaiting_full_capture(&self) -> bool {
        self.awaiting_full
    }

    #[cfg(test)]
    pub fn deferred_tiles(&self) -> u64 {
        self.deferred
    }

    /// Adopt the geometry of a (re)connected deck.
    ///
    /// The buffer is reallocated when the pixel dimensions change; either
    /// way the next dirty tiles wait for a full capture.
    pub fn rebuild(&mut self, panel: Panel) {
        if !self.panel.same_dimensions(&panel) || self.frame.len() != panel.frame_len() {
            info!("Framebuffer rebuilt: {} -> {}", self.panel, panel);
            self.frame = vec![0; panel.frame_len()];
        }
        self.panel = panel;
        self.awaiting_full = true;
        self.deferred = 0;
    }

    /// Apply a one-shot full-panel capture.
    ///
    /// A capture that does not cover the whole panel (for example a
    /// snapshot still at the previous model's size) leaves the gate closed.
    pub fn apply_full(&mut self, tile: &Tile) -> ApplyOutcome {
        let full = self.panel.full_rect();
        if !tile.rect.covers(&full) || tile.available_rows() < full.height {
            debug!(
                "Full capture {}x{}+{}+{} does not cover the {} panel, waiting",
                tile.rect.width, tile.rect.height, tile.rect.x, tile.rect.y, self.panel
            );
            self.deferred += 1;
            return ApplyOutcome::Deferred;
        }
        self.awaiting_full = false;
        if self.deferred > 0 {
            debug!("Full capture applied after {} deferred tiles", self.deferred);
            self.deferred = 0;
        }
        self.blit(tile)
    }

    /// Apply a dirty-rectangle tile
    pub fn apply(&mut self, tile: &Tile) -> ApplyOutcome {
        if self.awaiting_full {
            self.deferred += 1;
            return ApplyOutcome::Deferred;
        }
        self.blit(tile)
    }

    /// Copy the visible part of `tile` into the framebuffer
    fn blit(&mut self, tile: &Tile) -> ApplyOutcome {
        let panel_width = self.panel.width();
        let (columns, rows) = tile
            .rect
            .clipped_extent(panel_width, self.panel.height());
        let rows = rows.min(tile.available_rows());
        if columns == 0 || rows == 0 {
            return ApplyOutcome::Clipped;
        }

        let row_bytes = columns as usize * STRIDE_DECK;
        for row in 0..rows {
            let Some(src) = tile.row(row) else {
                break;
            };
            let offset = ((tile.rect.y + row) as usize * panel_width as usize
                + tile.rect.x as usize)
                * STRIDE_DECK;
            let Some(dst) = self.frame.get_mut(offset..offset + row_bytes) else {
                break;
            };
            convert_row(src, dst, columns as usize, tile.order);
        }

        debug!(
            "Tile {}x{}+{}+{} applied ({}x{} visible)",
            tile.rect.width, tile.rect.height, tile.rect.x, tile.rect.y, columns, rows
        );
        ApplyOutcome::Applied { columns, rows }
    }
}
