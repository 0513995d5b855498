//! Device driver interface
//!
//! The bridge only talks to hardware through these traits, so the
//! connection state machine can be exercised without a deck attached.

use serde::Serialize;

use super::error::DeckError;
use crate::frame::Panel;

/// A discoverable deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Serial number (empty if the device does not report one)
    #[serde(rename = "serialNumber")]
    pub serial: String,
    /// Device node used to open it
    pub path: String,
    /// Human-readable model name
    pub model: String,
    /// USB product id (selects the protocol/geometry)
    #[serde(skip)]
    pub product_id: u16,
}

/// Key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEdge {
    Down,
    Up,
}

/// Physical key press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// 0-based, row-major key index
    pub index: u32,
    pub edge: KeyEdge,
}

impl KeyEvent {
    pub const fn down(index: u32) -> Self {
        Self {
            index,
            edge: KeyEdge::Down,
        }
    }

    pub const fn up(index: u32) -> Self {
        Self {
            index,
            edge: KeyEdge::Up,
        }
    }
}

/// Event reported by an open device
#[derive(Debug)]
pub enum DeckEvent {
    Key(KeyEvent),
    Error(DeckError),
}

/// An open deck
pub trait DeckHandle {
    /// Model name
    fn model(&self) -> &str;

    /// Key grid of this model
    fn panel(&self) -> Panel;

    fn serial_number(&mut self) -> Result<String, DeckError>;

    /// Blank every key
    fn clear_all_keys(&mut self) -> Result<(), DeckError>;

    /// Replace the whole panel with an RGB frame of `panel().frame_len()` bytes
    fn fill_panel(&mut self, rgb: &[u8]) -> Result<(), DeckError>;

    /// Brightness in percent (already clamped to 0-100)
    fn set_brightness(&mut self, percent: u8) -> Result<(), DeckError>;

    /// Show the vendor logo
    fn reset_to_logo(&mut self) -> Result<(), DeckError>;

    /// Drain pending key/error events without blocking
    fn poll_events(&mut self) -> Vec<DeckEvent>;
}

/// Device discovery and opening
pub trait DeckDriver {
    type Handle: DeckHandle;

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeckError>;

    fn open(&self, info: &DeviceInfo) -> Result<Self::Handle, DeckError>;
}

/// Turns full key-state reports into press/release edges
#[derive(Debug, Default)]
pub struct KeyStateTracker {
    pressed: Vec<bool>,
}

impl KeyStateTracker {
    pub fn new(key_count: usize) -> Self {
        Self {
            pressed: vec![false; key_count],
        }
    }

    /// Compare a state report (non-zero byte = pressed) with the last one
    pub fn update(&mut self, states: &[u8]) -> Vec<KeyEvent> {
        let mut events = Vec::new();
        for (index, (prev, &state)) in self.pressed.iter_mut().zip(states).enumerate() {
            let now = state != 0;
            if now != *prev {
                *prev = now;
                events.push(if now {
                    KeyEvent::down(index as u32)
                } else {
                    KeyEvent::up(index as u32)
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state_edges() {
        let mut tracker = KeyStateTracker::new(4);
        assert!(tracker.update(&[0, 0, 0, 0]).is_empty());
        assert_eq!(tracker.update(&[0, 1, 0, 0]), vec![KeyEvent::down(1)]);
        assert!(tracker.update(&[0, 1, 0, 0]).is_empty());
        assert_eq!(
            tracker.update(&[1, 0, 0, 0]),
            vec![KeyEvent::down(0), KeyEvent::up(1)]
        );
    }

    #[test]
    fn test_key_state_short_report() {
        let mut tracker = KeyStateTracker::new(4);
        assert_eq!(tracker.update(&[1]), vec![KeyEvent::down(0)]);
    }

    #[test]
    fn test_device_info_json() {
        let info = DeviceInfo {
            serial: "AL12K1A00000".into(),
            path: "/dev/hidraw3".into(),
            model: "Stream Deck MK.2".into(),
            product_id: 0x0080,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["serialNumber"], "AL12K1A00000");
        assert_eq!(json["path"], "/dev/hidraw3");
        assert!(json.get("productId").is_none());
    }
}
