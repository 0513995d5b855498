//! Rendering surface
//!
//! The surface is the page being mirrored. Requests go out through the
//! [`Surface`] trait; captures, frame updates and navigation notifications
//! come back as [`SurfaceEvent`]s on the control loop's channel.

pub mod snapshot;

use anyhow::Result;

use crate::frame::{Rect, Tile};
use crate::input::PointerEvent;

#[derive(Debug)]
pub enum SurfaceEvent {
    /// Answer to [`Surface::capture_page`]
    FullCapture(Tile),
    /// Dirty-rectangle update from the frame stream
    Frame(Tile),
    Navigated { url: String, main_frame: bool },
}

pub trait Surface {
    /// Request a one-shot capture of `rect`; delivered as `FullCapture`
    fn capture_page(&mut self, rect: Rect) -> Result<()>;

    fn send_input(&mut self, event: &PointerEvent) -> Result<()>;

    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Logical viewport size
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;
}

pub use snapshot::SnapshotSurface;
#[cfg(target_os = "linux")]
pub use snapshot::FrameWatcher;
