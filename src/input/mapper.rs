//! Key index → surface coordinate
//!
//! The surface is sized in logical pixels (panel pixels / display scale),
//! so key centres are divided by the scale factor before injection.

use serde::Serialize;

use crate::deck::{KeyEdge, KeyEvent};
use crate::frame::Panel;

/// Point in the surface's logical coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
}

/// Synthetic pointer input for the surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerEvent {
    MouseMove {
        x: f64,
        y: f64,
    },
    #[serde(rename_all = "camelCase")]
    MouseDown {
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    MouseUp {
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    },
}

/// Centre of `key` in surface coordinates
pub fn key_to_point(key: u32, panel: &Panel, scale: f64) -> Point {
    let columns = panel.columns.max(1);
    let col = f64::from(key % columns);
    let row = f64::from(key / columns);
    let cell = f64::from(panel.cell_size);
    Point {
        x: (col + 0.5) * cell / scale,
        y: (row + 0.5) * cell / scale,
    }
}

/// Pointer events for one key edge.
///
/// Down: move then press. Up: release. The point is computed for every
/// edge so a geometry change between press and release is honoured.
pub fn pointer_events(event: KeyEvent, panel: &Panel, scale: f64) -> Vec<PointerEvent> {
    let Point { x, y } = key_to_point(event.index, panel, scale);
    match event.edge {
        KeyEdge::Down => vec![
            PointerEvent::MouseMove { x, y },
            PointerEvent::MouseDown {
                x,
                y,
                button: MouseButton::Left,
                click_count: 1,
            },
        ],
        KeyEdge::Up => vec![PointerEvent::MouseUp {
            x,
            y,
            button: MouseButton::Left,
            click_count: 1,
        }],
    }
}

/// Logical surface size for a panel (rounded)
pub fn surface_size(panel: &Panel, scale: f64) -> (u32, u32) {
    (
        (f64::from(panel.width()) / scale).round() as u32,
        (f64::from(panel.height()) / scale).round() as u32,
    )
}
