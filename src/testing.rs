//! In-memory driver and surface for unit tests

use anyhow::{anyhow, Result};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::deck::models::find_model;
use crate::deck::{DeckDriver, DeckError, DeckEvent, DeckHandle, DeviceInfo};
use crate::frame::{Panel, Rect};
use crate::input::PointerEvent;
use crate::surface::Surface;

pub const MK2: u16 = 0x0080;
pub const XL: u16 = 0x006c;

pub fn mock_device(serial: &str, product_id: u16) -> DeviceInfo {
    DeviceInfo {
        serial: serial.to_string(),
        path: format!("/dev/mock-{serial}"),
        model: find_model(product_id)
            .map(|m| m.name.to_string())
            .unwrap_or_default(),
        product_id,
    }
}

/// Everything the mock deck has been asked to do
#[derive(Debug, Default)]
pub struct MockState {
    pub devices: Vec<DeviceInfo>,
    pub opens: u32,
    pub clears: u32,
    /// Length of every frame that was accepted
    pub fills: Vec<usize>,
    pub brightness: Vec<u8>,
    pub resets: u32,
    pub fail_reset: bool,
    pub fill_errors: VecDeque<DeckError>,
    pub events: VecDeque<DeckEvent>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Rc<RefCell<MockState>>,
}

impl MockDriver {
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        let driver = Self::default();
        driver.set_devices(devices);
        driver
    }

    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        self.state.borrow_mut().devices = devices;
    }

    pub fn fail_next_fill(&self, err: DeckError) {
        self.state.borrow_mut().fill_errors.push_back(err);
    }

    pub fn queue_event(&self, event: DeckEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }
}

impl DeckDriver for MockDriver {
    type Handle = MockHandle;

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeckError> {
        Ok(self.state.borrow().devices.clone())
    }

    fn open(&self, info: &DeviceInfo) -> Result<MockHandle, DeckError> {
        let model =
            find_model(info.product_id).ok_or(DeckError::UnsupportedModel(info.product_id))?;
        self.state.borrow_mut().opens += 1;
        Ok(MockHandle {
            state: Rc::clone(&self.state),
            serial: info.serial.clone(),
            model: model.name,
            panel: model.panel(),
        })
    }
}

pub struct MockHandle {
    state: Rc<RefCell<MockState>>,
    serial: String,
    model: &'static str,
    panel: Panel,
}

impl DeckHandle for MockHandle {
    fn model(&self) -> &str {
        self.model
    }

    fn panel(&self) -> Panel {
        self.panel
    }

    fn serial_number(&mut self) -> Result<String, DeckError> {
        Ok(self.serial.clone())
    }

    fn clear_all_keys(&mut self) -> Result<(), DeckError> {
        self.state.borrow_mut().clears += 1;
        Ok(())
    }

    fn fill_panel(&mut self, rgb: &[u8]) -> Result<(), DeckError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.fill_errors.pop_front() {
            return Err(err);
        }
        state.fills.push(rgb.len());
        Ok(())
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeckError> {
        self.state.borrow_mut().brightness.push(percent);
        Ok(())
    }

    fn reset_to_logo(&mut self) -> Result<(), DeckError> {
        let mut state = self.state.borrow_mut();
        state.resets += 1;
        if state.fail_reset {
            return Err(DeckError::Device("reset rejected".into()));
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<DeckEvent> {
        self.state.borrow_mut().events.drain(..).collect()
    }
}

/// Requests the app made of the surface
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub captures: Vec<Rect>,
    pub inputs: Vec<PointerEvent>,
    pub navigations: Vec<String>,
    pub resizes: Vec<(u32, u32)>,
    pub fail_navigation: bool,
}

#[derive(Clone, Default)]
pub struct MockSurface {
    log: Rc<RefCell<SurfaceLog>>,
}

impl MockSurface {
    pub fn log(&self) -> Ref<'_, SurfaceLog> {
        self.log.borrow()
    }

    pub fn log_mut(&self) -> RefMut<'_, SurfaceLog> {
        self.log.borrow_mut()
    }
}

impl Surface for MockSurface {
    fn capture_page(&mut self, rect: Rect) -> Result<()> {
        self.log.borrow_mut().captures.push(rect);
        Ok(())
    }

    fn send_input(&mut self, event: &PointerEvent) -> Result<()> {
        self.log.borrow_mut().inputs.push(event.clone());
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        let mut log = self.log.borrow_mut();
        if log.fail_navigation {
            return Err(anyhow!("navigation refused"));
        }
        log.navigations.push(url.to_string());
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.log.borrow_mut().resizes.push((width, height));
        Ok(())
    }
}
