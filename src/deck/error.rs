//! Device error taxonomy
//!
//! Errors are classified rather than matched by call sites:
//! connectivity errors move the bridge to `Disconnected`, fatal errors end
//! the process at startup, everything else is logged and skipped.

use thiserror::Error;

use super::driver::DeviceInfo;
use crate::constants::{EXIT_DEVICE_NOT_FOUND, EXIT_NO_DEVICES};

#[derive(Debug, Error)]
pub enum DeckError {
    /// Nothing to connect to
    #[error("No Stream Deck found")]
    NoDevices,

    /// A specific serial number was requested but is not attached
    #[error("Could not find device with S/N: \"{serial}\"")]
    DeviceNotFound {
        serial: String,
        available: Vec<DeviceInfo>,
    },

    /// The link to the device is gone (unplugged, reset, hub power loss)
    #[error("Connection lost: {0}")]
    Connectivity(String),

    /// The device answered but the operation failed
    #[error("Device error: {0}")]
    Device(String),

    #[error("Unsupported Stream Deck model (product id {0:#06x})")]
    UnsupportedModel(u16),

    /// A frame of the wrong size was offered for the connected panel
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Key image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeckError {
    /// True when the error means the device link was lost
    pub fn is_connectivity(&self) -> bool {
        match self {
            DeckError::Connectivity(_) => true,
            DeckError::Io(err) => is_connectivity_io(err),
            DeckError::Device(msg) => is_connectivity_message(msg),
            _ => false,
        }
    }

    /// True for startup errors that end the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeckError::NoDevices | DeckError::DeviceNotFound { .. })
    }

    /// Process exit status for fatal errors
    pub fn exit_code(&self) -> i32 {
        match self {
            DeckError::DeviceNotFound { .. } => EXIT_DEVICE_NOT_FOUND,
            DeckError::NoDevices => EXIT_NO_DEVICES,
            _ => 1,
        }
    }
}

fn is_connectivity_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    if matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotFound
    ) {
        return true;
    }
    matches!(
        err.raw_os_error(),
        Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EIO) | Some(libc::ESHUTDOWN)
    )
}

/// Driver messages that signal a lost link ("could not read from HID device")
fn is_connectivity_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    (msg.contains("could not read") || msg.contains("could not write"))
        && msg.contains("hid device")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_connectivity_classification() {
        assert!(DeckError::Connectivity("gone".into()).is_connectivity());
        assert!(DeckError::Io(io::Error::from_raw_os_error(libc::ENODEV)).is_connectivity());
        assert!(DeckError::Io(io::Error::from_raw_os_error(libc::EIO)).is_connectivity());
        assert!(DeckError::Io(io::ErrorKind::BrokenPipe.into()).is_connectivity());
        assert!(DeckError::Device("Could not read from HID device".into()).is_connectivity());

        assert!(!DeckError::Device("brightness rejected".into()).is_connectivity());
        assert!(!DeckError::Io(io::ErrorKind::WouldBlock.into()).is_connectivity());
        assert!(!DeckError::FrameSize {
            expected: 3,
            actual: 2
        }
        .is_connectivity());
    }

    #[test]
    fn test_fatal_exit_codes() {
        let missing = DeckError::DeviceNotFound {
            serial: "AL123".into(),
            available: vec![],
        };
        assert!(missing.is_fatal());
        assert_eq!(missing.exit_code(), EXIT_DEVICE_NOT_FOUND);
        assert!(DeckError::NoDevices.is_fatal());
        assert_eq!(DeckError::NoDevices.exit_code(), EXIT_NO_DEVICES);
        assert!(!DeckError::Connectivity("x".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let missing = DeckError::DeviceNotFound {
            serial: "AL123".into(),
            available: vec![],
        };
        assert_eq!(missing.to_string(), "Could not find device with S/N: \"AL123\"");
    }
}
