//! Pixel format conversion
//!
//! The rendering surface hands out 4 bytes per pixel with alpha last;
//! the deck takes 3 bytes per pixel in RGB order. Which of the first
//! three source bytes is red depends on the surface, so every tile
//! carries its [`SourceOrder`].

use crate::constants::{STRIDE_DECK, STRIDE_SURFACE};

/// Channel order of a 4-byte source pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceOrder {
    /// Blue, green, red, alpha (Chromium's native bitmap layout)
    #[default]
    Bgra,
    /// Red, green, blue, alpha (decoded image files)
    Rgba,
}

impl SourceOrder {
    /// Source byte offsets for the output red, green and blue bytes
    #[inline]
    pub const fn channel_map(self) -> [usize; 3] {
        match self {
            SourceOrder::Bgra => [2, 1, 0],
            SourceOrder::Rgba => [0, 1, 2],
        }
    }
}

/// Convert up to `pixels` pixels from `src` into `dst`.
///
/// Alpha is dropped. Conversion stops early if either slice runs out,
/// so neither buffer is ever indexed past its end.
///
/// Returns the number of pixels written.
#[inline]
pub fn convert_row(src: &[u8], dst: &mut [u8], pixels: usize, order: SourceOrder) -> usize {
    let [r, g, b] = order.channel_map();
    let mut written = 0;
    for (s, d) in src
        .chunks_exact(STRIDE_SURFACE)
        .zip(dst.chunks_exact_mut(STRIDE_DECK))
        .take(pixels)
    {
        d[0] = s[r];
        d[1] = s[g];
        d[2] = s[b];
        written += 1;
    }
    written
}
