//! Device bridge
//!
//! Owns the connection to one deck. The device handle only exists inside
//! the `Connected` variant, so every operation has to match on the state
//! instead of checking for a missing handle.
//!
//! ```text
//! NotConnected ──open──▶ Connected ──connectivity error──▶ Disconnected
//!                            ▲                                  │
//!                            │ retry ok          begin_reconnect│
//!                            └──────────── Reconnecting ◀───────┘
//!                                             │  ▲ retry failed
//!                                             └──┘
//! ```

use log::{debug, info, warn};

use super::driver::{DeckDriver, DeckEvent, DeckHandle, DeviceInfo};
use super::error::DeckError;
use crate::constants::{clamp_brightness, DEFAULT_BRIGHTNESS};
use crate::frame::Panel;

/// Model and serial number of a connected (or last connected) deck
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub model: String,
    pub serial: String,
}

/// Observable connection state
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Connected,
    Disconnected,
    Reconnecting,
}

/// Result of a framebuffer push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    /// No live connection, or the frame does not match the panel
    Skipped,
    /// The device rejected the frame; still connected
    Failed,
    /// The push lost the connection; the bridge is now `Disconnected`
    ConnectionLost,
}

struct Live<H> {
    handle: H,
    identity: Identity,
    panel: Panel,
}

enum Connection<H> {
    NotConnected,
    Connected(Live<H>),
    Disconnected { identity: Identity },
    Reconnecting { identity: Identity, attempts: u32 },
}

pub struct DeviceBridge<D: DeckDriver> {
    driver: D,
    connection: Connection<D::Handle>,
    /// Serial requested at startup; reconnects never substitute another deck
    preferred_serial: Option<String>,
    brightness: u8,
}

impl<D: DeckDriver> DeviceBridge<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            connection: Connection::NotConnected,
            preferred_serial: None,
            brightness: clamp_brightness(DEFAULT_BRIGHTNESS),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        match self.connection {
            Connection::NotConnected => ConnectionState::NotConnected,
            Connection::Connected(_) => ConnectionState::Connected,
            Connection::Disconnected { .. } => ConnectionState::Disconnected,
            Connection::Reconnecting { .. } => ConnectionState::Reconnecting,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, Connection::Connected(_))
    }

    /// Identity of the connected deck, or of the one being reconnected
    pub fn identity(&self) -> Option<&Identity> {
        match &self.connection {
            Connection::NotConnected => None,
            Connection::Connected(live) => Some(&live.identity),
            Connection::Disconnected { identity } => Some(identity),
            Connection::Reconnecting { identity, .. } => Some(identity),
        }
    }

    /// Panel of the connected deck
    pub fn panel(&self) -> Option<Panel> {
        match &self.connection {
            Connection::Connected(live) => Some(live.panel),
            _ => None,
        }
    }

    /// Number of failed attempts in the current reconnect cycle
    pub fn reconnect_attempts(&self) -> u32 {
        match self.connection {
            Connection::Reconnecting { attempts, .. } => attempts,
            _ => 0,
        }
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeckError> {
        self.driver.list_devices()
    }

    /// Startup open. `NoDevices` and `DeviceNotFound` are fatal to the caller.
    pub fn open(&mut self, preferred_serial: Option<&str>) -> Result<Identity, DeckError> {
        self.preferred_serial = preferred_serial.map(str::to_string);
        let devices = self.driver.list_devices()?;
        let info = select_device(&devices, preferred_serial)?;
        self.connect(info)
    }

    /// Disconnected → Reconnecting. Returns false in any other state.
    pub fn begin_reconnect(&mut self) -> bool {
        match std::mem::replace(&mut self.connection, Connection::NotConnected) {
            Connection::Disconnected { identity } => {
                info!("Waiting for Stream Deck {} to come back", identity.serial);
                self.connection = Connection::Reconnecting {
                    identity,
                    attempts: 0,
                };
                true
            }
            other => {
                self.connection = other;
                false
            }
        }
    }

    /// One reconnect attempt.
    ///
    /// On success the bridge is `Connected` and the caller must rebuild its
    /// framebuffer for the returned panel. On failure it stays `Reconnecting`.
    pub fn try_reconnect(&mut self) -> Result<(Identity, Panel), DeckError> {
        if let Connection::Connected(live) = &self.connection {
            return Ok((live.identity.clone(), live.panel));
        }
        if matches!(self.connection, Connection::Disconnected { .. }) {
            self.begin_reconnect();
        }
        let Connection::Reconnecting { attempts, .. } = &mut self.connection else {
            return Err(DeckError::NoDevices);
        };
        *attempts += 1;
        let attempt = *attempts;

        let result = self
            .driver
            .list_devices()
            .and_then(|devices| {
                select_device(&devices, self.preferred_serial.as_deref()).cloned()
            })
            .and_then(|info| self.connect(&info));

        match result {
            Ok(identity) => {
                info!("Reconnected after {} attempt(s)", attempt);
                let panel = self.panel().ok_or(DeckError::NoDevices)?;
                Ok((identity, panel))
            }
            Err(e) => {
                debug!("Reconnect attempt {} failed: {}", attempt, e);
                Err(e)
            }
        }
    }

    /// Push the whole framebuffer. Connectivity errors are absorbed here.
    pub fn push(&mut self, frame: &[u8]) -> PushOutcome {
        let Connection::Connected(live) = &mut self.connection else {
            return PushOutcome::Skipped;
        };
        if frame.len() != live.panel.frame_len() {
            warn!(
                "Frame of {} bytes does not fit {} panel, not pushed",
                frame.len(),
                live.panel
            );
            return PushOutcome::Skipped;
        }

        match live.handle.fill_panel(frame) {
            Ok(()) => PushOutcome::Sent,
            Err(e) => {
                if self.handle_error(e) {
                    PushOutcome::ConnectionLost
                } else {
                    PushOutcome::Failed
                }
            }
        }
    }

    /// Classify a device error. Returns true if the connection was lost.
    pub fn handle_error(&mut self, err: DeckError) -> bool {
        if err.is_connectivity() {
            warn!("Stream Deck connection lost: {}", err);
            self.mark_disconnected();
            true
        } else {
            warn!("Stream Deck error: {}", err);
            false
        }
    }

    /// Store and apply a brightness level (clamped to 0-100). Returns the
    /// stored value.
    pub fn set_brightness(&mut self, level: i32) -> u8 {
        self.brightness = clamp_brightness(level);
        if let Connection::Connected(live) = &mut self.connection {
            if let Err(e) = live.handle.set_brightness(self.brightness) {
                self.handle_error(e);
            }
        }
        self.brightness
    }

    /// Best effort; failures are ignored
    pub fn reset_to_logo(&mut self) {
        if let Connection::Connected(live) = &mut self.connection {
            if let Err(e) = live.handle.reset_to_logo() {
                debug!("Reset to logo failed: {}", e);
            }
        }
    }

    /// Drain pending events of the connected deck
    pub fn poll_events(&mut self) -> Vec<DeckEvent> {
        match &mut self.connection {
            Connection::Connected(live) => live.handle.poll_events(),
            _ => Vec::new(),
        }
    }

    /// Reset the deck and release the handle
    pub fn shutdown(&mut self) {
        self.reset_to_logo();
        if let Connection::Connected(live) = &self.connection {
            info!("Releasing Stream Deck {}", live.identity.serial);
        }
        self.connection = Connection::NotConnected;
    }

    fn connect(&mut self, info: &DeviceInfo) -> Result<Identity, DeckError> {
        let mut handle = self.driver.open(info)?;

        let serial = match handle.serial_number() {
            Ok(serial) if !serial.is_empty() => serial,
            Ok(_) => info.serial.clone(),
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => {
                warn!("Could not read serial number: {}", e);
                info.serial.clone()
            }
        };

        if let Err(e) = handle.clear_all_keys() {
            if e.is_connectivity() {
                return Err(e);
            }
            warn!("Could not clear keys: {}", e);
        }
        if let Err(e) = handle.set_brightness(self.brightness) {
            if e.is_connectivity() {
                return Err(e);
            }
            warn!("Could not set brightness: {}", e);
        }

        let identity = Identity {
            model: handle.model().to_string(),
            serial,
        };
        let panel = handle.panel();
        info!(
            "Connected to Stream Deck, Model: {}, S/N: {} ({})",
            identity.model, identity.serial, panel
        );

        self.connection = Connection::Connected(Live {
            handle,
            identity: identity.clone(),
            panel,
        });
        Ok(identity)
    }

    /// Connected → Disconnected, dropping the handle
    fn mark_disconnected(&mut self) {
        self.connection = match std::mem::replace(&mut self.connection, Connection::NotConnected)
        {
            Connection::Connected(mut live) => {
                let _ = live.handle.reset_to_logo();
                Connection::Disconnected {
                    identity: live.identity,
                }
            }
            other => other,
        };
    }
}

/// Pick the device to open: the requested serial, else the first one
fn select_device<'a>(
    devices: &'a [DeviceInfo],
    preferred_serial: Option<&str>,
) -> Result<&'a DeviceInfo, DeckError> {
    if devices.is_empty() {
        return Err(DeckError::NoDevices);
    }
    match preferred_serial {
        Some(serial) => devices
            .iter()
            .find(|d| d.serial == serial)
            .ok_or_else(|| DeckError::DeviceNotFound {
                serial: serial.to_string(),
                available: devices.to_vec(),
            }),
        None => Ok(&devices[0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_device, MockDriver, MK2, XL};
    use std::io;

    fn connected(devices: Vec<DeviceInfo>) -> (DeviceBridge<MockDriver>, MockDriver) {
        let driver = MockDriver::with_devices(devices);
        let mut bridge = DeviceBridge::new(driver.clone());
        bridge.open(None).unwrap();
        (bridge, driver)
    }

    #[test]
    fn test_open_first_device() {
        let (bridge, driver) = connected(vec![mock_device("A", MK2), mock_device("B", XL)]);
        assert_eq!(bridge.state(), ConnectionState::Connected);
        assert_eq!(bridge.identity().unwrap().serial, "A");
        assert_eq!(bridge.panel().unwrap().columns, 5);

        let state = driver.state();
        assert_eq!(state.clears, 1);
        assert_eq!(state.brightness, vec![clamp_brightness(DEFAULT_BRIGHTNESS)]);
    }

    #[test]
    fn test_open_preferred_serial() {
        let driver = MockDriver::with_devices(vec![mock_device("A", MK2), mock_device("B", XL)]);
        let mut bridge = DeviceBridge::new(driver);
        let identity = bridge.open(Some("B")).unwrap();
        assert_eq!(identity.serial, "B");
        assert_eq!(bridge.panel().unwrap().columns, 8);
    }

    #[test]
    fn test_open_fatal_errors() {
        let mut bridge = DeviceBridge::new(MockDriver::with_devices(vec![]));
        let err = bridge.open(None).unwrap_err();
        assert!(matches!(err, DeckError::NoDevices));
        assert!(err.is_fatal());

        let mut bridge = DeviceBridge::new(MockDriver::with_devices(vec![mock_device("A", MK2)]));
        match bridge.open(Some("Z")).unwrap_err() {
            DeckError::DeviceNotFound { serial, available } => {
                assert_eq!(serial, "Z");
                assert_eq!(available.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(bridge.state(), ConnectionState::NotConnected);
    }

    #[test]
    fn test_push_sends_full_frame() {
        let (mut bridge, driver) = connected(vec![mock_device("A", MK2)]);
        let frame = vec![0u8; bridge.panel().unwrap().frame_len()];
        assert_eq!(bridge.push(&frame), PushOutcome::Sent);
        assert_eq!(driver.state().fills, vec![frame.len()]);
        assert_eq!(bridge.push(&frame[1..]), PushOutcome::Skipped);
    }

    #[test]
    fn test_connectivity_error_disconnects() {
        let (mut bridge, driver) = connected(vec![mock_device("A", MK2)]);
        let frame = vec![0u8; bridge.panel().unwrap().frame_len()];

        driver.fail_next_fill(DeckError::Io(io::Error::from_raw_os_error(libc::ENODEV)));
        assert_eq!(bridge.push(&frame), PushOutcome::ConnectionLost);
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        assert_eq!(bridge.identity().unwrap().serial, "A");
        assert!(bridge.panel().is_none());

        // Further pushes are suppressed
        assert_eq!(bridge.push(&frame), PushOutcome::Skipped);
        assert_eq!(driver.state().fills.len(), 0);
    }

    #[test]
    fn test_other_errors_keep_connection() {
        let (mut bridge, driver) = connected(vec![mock_device("A", MK2)]);
        let frame = vec![0u8; bridge.panel().unwrap().frame_len()];

        driver.fail_next_fill(DeckError::Device("report rejected".into()));
        assert_eq!(bridge.push(&frame), PushOutcome::Failed);
        assert_eq!(bridge.state(), ConnectionState::Connected);
        assert_eq!(bridge.push(&frame), PushOutcome::Sent);
    }

    #[test]
    fn test_brightness_is_clamped() {
        let (mut bridge, driver) = connected(vec![mock_device("A", MK2)]);
        assert_eq!(bridge.set_brightness(-10), 0);
        assert_eq!(bridge.set_brightness(150), 100);
        assert_eq!(bridge.set_brightness(50), 50);
        assert_eq!(driver.state().brightness[1..], [0, 100, 50]);
    }

    #[test]
    fn test_reconnect_waits_for_requested_serial() {
        let driver = MockDriver::with_devices(vec![mock_device("A", MK2)]);
        let mut bridge = DeviceBridge::new(driver.clone());
        bridge.open(Some("A")).unwrap();
        bridge.handle_error(DeckError::Connectivity("unplugged".into()));
        assert!(bridge.begin_reconnect());
        assert!(!bridge.begin_reconnect());

        // Only a different deck is attached: never substituted
        driver.set_devices(vec![mock_device("B", XL)]);
        assert!(bridge.try_reconnect().is_err());
        assert!(bridge.try_reconnect().is_err());
        assert_eq!(bridge.state(), ConnectionState::Reconnecting);
        assert_eq!(bridge.reconnect_attempts(), 2);
        assert_eq!(driver.state().opens, 1);

        driver.set_devices(vec![mock_device("B", XL), mock_device("A", MK2)]);
        let (identity, panel) = bridge.try_reconnect().unwrap();
        assert_eq!(identity.serial, "A");
        assert_eq!(panel.columns, 5);
        assert!(bridge.is_connected());
        assert_eq!(driver.state().opens, 2);
        assert_eq!(bridge.reconnect_attempts(), 0);
    }

    #[test]
    fn test_reconnect_any_device_without_preference() {
        let (mut bridge, driver) = connected(vec![mock_device("A", MK2)]);
        bridge.set_brightness(30);
        bridge.handle_error(DeckError::Connectivity("unplugged".into()));

        driver.set_devices(vec![mock_device("B", XL)]);
        let (identity, panel) = bridge.try_reconnect().unwrap();
        assert_eq!(identity.serial, "B");
        assert_eq!(panel.columns, 8);
        // Stored brightness re-applied on the new handle
        assert_eq!(driver.state().brightness.last(), Some(&30));
    }

    #[test]
    fn test_reset_failures_are_swallowed() {
        let (mut bridge, driver) = connected(vec![mock_device("A", MK2)]);
        driver.state_mut().fail_reset = true;
        bridge.reset_to_logo();
        bridge.shutdown();
        assert_eq!(bridge.state(), ConnectionState::NotConnected);
    }
}
