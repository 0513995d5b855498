//! Frame pipeline
//!
//! Turns rendering-surface tiles into the deck's pixel format and keeps
//! the last composited full-panel image.
//! - Pixel conversion (4-byte source → 3-byte RGB)
//! - Compositing with clipping into the owned framebuffer
//! - Push cadence limiting

pub mod compositor;
pub mod convert;
pub mod limiter;
pub mod panel;
pub mod tile;

pub use compositor::{ApplyOutcome, FrameCompositor};
pub use convert::{convert_row, SourceOrder};
pub use limiter::FrameLimiter;
pub use panel::Panel;
pub use tile::{Rect, Tile};
