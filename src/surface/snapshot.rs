//! File-backed surface for headless renderers
//!
//! An external renderer writes the page as an image file (PNG or JPEG);
//! each change is diffed against the previous snapshot and only the dirty
//! rectangle is emitted. Pointer input and viewport changes go back to the
//! renderer as JSON lines; navigation requests are written to `url_file`.
//!
//! Renderers should replace the file atomically (write + rename). A
//! half-written file fails to decode and is picked up on the next change.

use anyhow::{Context, Result};
use image::RgbaImage;
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

use super::{Surface, SurfaceEvent};
use crate::constants::STRIDE_SURFACE;
use crate::frame::{Rect, SourceOrder, Tile};
use crate::input::PointerEvent;

/// Where pointer events are written
enum InputSink {
    Stdout,
    File(File),
}

impl InputSink {
    fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(InputSink::Stdout),
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open input sink {}", path.display()))?;
                Ok(InputSink::File(file))
            }
        }
    }

    fn write_line<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)?;
        match self {
            InputSink::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", line)?;
                out.flush()?;
            }
            InputSink::File(file) => writeln!(file, "{}", line)?,
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ViewportMessage {
    Resize { width: u32, height: u32 },
}

pub struct SnapshotSurface {
    frame_path: PathBuf,
    url_file: Option<PathBuf>,
    sink: InputSink,
    events: UnboundedSender<SurfaceEvent>,
    previous: Option<RgbaImage>,
    /// Capture requested but no snapshot covering it yet
    pending_capture: Option<Rect>,
}

impl SnapshotSurface {
    pub fn new(
        frame_path: PathBuf,
        input_sink: Option<&Path>,
        url_file: Option<PathBuf>,
        events: UnboundedSender<SurfaceEvent>,
    ) -> Result<Self> {
        info!("Mirroring snapshots from {}", frame_path.display());
        Ok(Self {
            frame_path,
            url_file,
            sink: InputSink::open(input_sink)?,
            events,
            previous: None,
            pending_capture: None,
        })
    }

    /// The snapshot file changed: emit its dirty region.
    pub fn refresh(&mut self) -> Result<()> {
        let Some(next) = self.decode() else {
            return Ok(());
        };

        if let Some(rect) = self.pending_capture {
            if full_rect(&next).covers(&rect) {
                self.pending_capture = None;
                self.emit(SurfaceEvent::FullCapture(crop(&next, rect)));
            } else {
                debug!(
                    "Snapshot {}x{} still smaller than the {}x{} capture",
                    next.width(),
                    next.height(),
                    rect.width,
                    rect.height
                );
            }
        } else if let Some(dirty) = self
            .previous
            .as_ref()
            .map_or(Some(full_rect(&next)), |prev| dirty_rect(prev, &next))
        {
            debug!(
                "Snapshot dirty rect {}x{}+{}+{}",
                dirty.width, dirty.height, dirty.x, dirty.y
            );
            self.emit(SurfaceEvent::Frame(crop(&next, dirty)));
        }

        self.previous = Some(next);
        Ok(())
    }

    fn decode(&self) -> Option<RgbaImage> {
        match image::open(&self.frame_path) {
            Ok(image) => Some(image.to_rgba8()),
            Err(e) => {
                debug!("Snapshot {} not readable: {}", self.frame_path.display(), e);
                None
            }
        }
    }

    fn emit(&self, event: SurfaceEvent) {
        if self.events.send(event).is_err() {
            debug!("Surface event dropped: control loop gone");
        }
    }
}

impl Surface for SnapshotSurface {
    fn capture_page(&mut self, rect: Rect) -> Result<()> {
        match self.decode() {
            Some(image) if full_rect(&image).covers(&rect) => {
                self.emit(SurfaceEvent::FullCapture(crop(&image, rect)));
                self.previous = Some(image);
            }
            Some(image) => {
                info!(
                    "Snapshot is {}x{}, capture deferred until the renderer catches up to {}x{}",
                    image.width(),
                    image.height(),
                    rect.width,
                    rect.height
                );
                self.pending_capture = Some(rect);
                self.previous = Some(image);
            }
            None => {
                info!("No snapshot yet, capture deferred to the next frame");
                self.pending_capture = Some(rect);
            }
        }
        Ok(())
    }

    fn send_input(&mut self, event: &PointerEvent) -> Result<()> {
        self.sink.write_line(event)
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        if let Some(path) = &self.url_file {
            std::fs::write(path, format!("{}\n", url))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        } else {
            warn!("No url_file configured, renderer not told about {}", url);
        }
        self.emit(SurfaceEvent::Navigated {
            url: url.to_string(),
            main_frame: true,
        });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.sink.write_line(&ViewportMessage::Resize { width, height })
    }
}

fn full_rect(image: &RgbaImage) -> Rect {
    Rect::new(0, 0, image.width(), image.height())
}

/// Bounding box of the pixels that differ. `None` if identical.
/// A size change dirties the whole image.
pub fn dirty_rect(prev: &RgbaImage, next: &RgbaImage) -> Option<Rect> {
    if prev.dimensions() != next.dimensions() {
        return Some(full_rect(next));
    }

    let row_bytes = next.width() as usize * STRIDE_SURFACE;
    if row_bytes == 0 {
        return None;
    }
    let mut bounds: Option<(usize, usize, usize, usize)> = None;

    let rows = prev.as_raw().chunks_exact(row_bytes).zip(next.as_raw().chunks_exact(row_bytes));
    for (y, (a, b)) in rows.enumerate() {
        if a == b {
            continue;
        }
        let mut differing = a
            .chunks_exact(STRIDE_SURFACE)
            .zip(b.chunks_exact(STRIDE_SURFACE))
            .enumerate()
            .filter(|(_, (pa, pb))| pa != pb)
            .map(|(x, _)| x);
        let Some(first) = differing.next() else {
            continue;
        };
        let last = differing.last().unwrap_or(first);

        bounds = Some(match bounds {
            None => (first, y, last, y),
            Some((x0, y0, x1, _)) => (x0.min(first), y0, x1.max(last), y),
        });
    }

    bounds.map(|(x0, y0, x1, y1)| {
        Rect::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0 + 1) as u32,
            (y1 - y0 + 1) as u32,
        )
    })
}

/// Copy `rect` (clamped to the image) into an RGBA tile
fn crop(image: &RgbaImage, rect: Rect) -> Tile {
    let x = rect.x.min(image.width());
    let y = rect.y.min(image.height());
    let width = rect.width.min(image.width() - x);
    let height = rect.height.min(image.height() - y);

    let src_row = image.width() as usize * STRIDE_SURFACE;
    let row_bytes = width as usize * STRIDE_SURFACE;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in y..y + height {
        let start = row as usize * src_row + x as usize * STRIDE_SURFACE;
        pixels.extend_from_slice(&image.as_raw()[start..start + row_bytes]);
    }

    Tile::new(Rect::new(x, y, width, height), SourceOrder::Rgba, pixels)
}

/// Wakes the control loop when the snapshot file changes
#[cfg(target_os = "linux")]
pub struct FrameWatcher {
    _watcher: notify::RecommendedWatcher,
}

#[cfg(target_os = "linux")]
impl FrameWatcher {
    pub fn new(frame_path: &Path) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<()>)> {
        use notify::{Event, EventKind, RecursiveMode, Watcher};

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let file_name = frame_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                // Create covers write-then-rename
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event.paths.iter().any(|p| p.file_name() == file_name.as_deref())
                {
                    let _ = tx.send(());
                }
            }
        })?;

        // Watch the parent directory to catch renames
        let watch_path = frame_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_path.display()))?;

        Ok((Self { _watcher: watcher }, rx))
    }
}
