//! Stream Deck access
//!
//! - `driver`: traits the rest of the program talks to
//! - `bridge`: connection lifecycle on top of a driver
//! - `hidraw`: the Linux hidraw implementation

pub mod bridge;
pub mod driver;
pub mod error;
#[cfg(target_os = "linux")]
pub mod hidraw;
pub mod models;

#[cfg(test)]
pub use bridge::ConnectionState;
pub use bridge::{DeviceBridge, Identity, PushOutcome};
pub use driver::{DeckDriver, DeckEvent, DeckHandle, DeviceInfo, KeyEdge, KeyEvent};
pub use error::DeckError;
#[cfg(target_os = "linux")]
pub use hidraw::HidrawDriver;
