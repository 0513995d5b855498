//! Control loop state
//!
//! Every input (surface frames, deck events, timers, control requests)
//! arrives as an [`AppEvent`] and is handled by [`App::dispatch`]. The
//! framebuffer and the device connection are only touched from here, one
//! event at a time.

use log::{debug, info, warn};
use std::time::Instant;
use tokio::sync::oneshot;

use crate::config::Config;
use crate::constants::clamp_brightness;
use crate::control::{ControlCommand, ControlReply, ControlRequest, SettingsPatch, SettingsSnapshot};
use crate::deck::{DeckDriver, DeckEvent, DeviceBridge, KeyEvent, PushOutcome};
use crate::frame::{FrameCompositor, FrameLimiter, Tile};
use crate::input::{pointer_events, surface_size};
use crate::supervisor::ReconnectSupervisor;
use crate::surface::{Surface, SurfaceEvent};

#[derive(Debug)]
pub enum AppEvent {
    Surface(SurfaceEvent),
    Deck(DeckEvent),
    /// The reconnect timer fired
    ReconnectDue,
    /// The frame limiter's pending slot opened
    FlushTick,
    Control(ControlCommand),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct App<D: DeckDriver, S: Surface> {
    bridge: DeviceBridge<D>,
    surface: S,
    compositor: FrameCompositor,
    limiter: FrameLimiter,
    supervisor: ReconnectSupervisor,
    config: Config,
    /// Write control-channel changes back to the config file
    persist: bool,
    current_url: String,
    help: String,
}

impl<D: DeckDriver, S: Surface> App<D, S> {
    /// `bridge` must already be connected.
    pub fn new(
        bridge: DeviceBridge<D>,
        surface: S,
        config: Config,
        persist: bool,
        help: String,
    ) -> anyhow::Result<Self> {
        let panel = bridge
            .panel()
            .ok_or_else(|| anyhow::anyhow!("Stream Deck not connected"))?;
        Ok(Self {
            compositor: FrameCompositor::new(panel),
            limiter: FrameLimiter::new(config.max_fps()),
            supervisor: ReconnectSupervisor::new(config.reconnect_interval()),
            current_url: config.general.url.clone(),
            bridge,
            surface,
            config,
            persist,
            help,
        })
    }

    /// Size the surface, load the start page and request the first capture
    pub fn start(&mut self) {
        self.resize_surface();
        let url = self.current_url.clone();
        if let Err(e) = self.surface.navigate(&url) {
            warn!("Failed to open {}: {:#}", url, e);
        }
        self.request_full_capture();
    }

    #[cfg(test)]
    pub fn bridge(&self) -> &DeviceBridge<D> {
        &self.bridge
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    #[cfg(test)]
    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    #[cfg(test)]
    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.supervisor.deadline()
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        if self.bridge.is_connected() {
            self.limiter.next_deadline()
        } else {
            None
        }
    }

    /// Drain deck input and dispatch it
    pub fn poll_deck(&mut self, now: Instant) {
        for event in self.bridge.poll_events() {
            self.dispatch(AppEvent::Deck(event), now);
        }
    }

    pub fn dispatch(&mut self, event: AppEvent, now: Instant) -> Flow {
        match event {
            AppEvent::Surface(SurfaceEvent::FullCapture(tile)) => self.on_full_capture(&tile, now),
            AppEvent::Surface(SurfaceEvent::Frame(tile)) => self.on_frame(&tile, now),
            AppEvent::Surface(SurfaceEvent::Navigated { url, main_frame }) => {
                if main_frame {
                    debug!("Navigated to {}", url);
                    self.current_url = url;
                }
            }
            AppEvent::Deck(DeckEvent::Key(key)) => self.on_key(key),
            AppEvent::Deck(DeckEvent::Error(err)) => {
                if self.bridge.handle_error(err) {
                    self.on_connection_lost(now);
                }
            }
            AppEvent::ReconnectDue => self.on_reconnect_due(now),
            AppEvent::FlushTick => {
                if self.limiter.flush(now) {
                    self.push(now);
                }
            }
            AppEvent::Control(ControlCommand { request, reply }) => {
                self.on_control(request, reply, now)
            }
            AppEvent::Shutdown => {
                self.shutdown();
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Cancel the retry timer and hand the deck back to its logo
    pub fn shutdown(&mut self) {
        self.supervisor.cancel();
        self.bridge.shutdown();
    }

    fn on_full_capture(&mut self, tile: &Tile, now: Instant) {
        if self.compositor.apply_full(tile).needs_push() {
            self.request_push(now);
        }
    }

    fn on_frame(&mut self, tile: &Tile, now: Instant) {
        if self.compositor.apply(tile).needs_push() {
            self.request_push(now);
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        // Geometry comes from the live connection; no panel, no mapping
        let Some(panel) = self.bridge.panel() else {
            debug!("Key {} ignored while disconnected", key.index);
            return;
        };
        for event in pointer_events(key, &panel, self.config.scale_factor()) {
            if let Err(e) = self.surface.send_input(&event) {
                warn!("Failed to send input: {:#}", e);
                break;
            }
        }
    }

    fn request_push(&mut self, now: Instant) {
        if self.bridge.is_connected() && self.limiter.request(now) {
            self.push(now);
        }
    }

    fn push(&mut self, now: Instant) {
        if self.bridge.push(self.compositor.frame()) == PushOutcome::ConnectionLost {
            self.on_connection_lost(now);
        }
    }

    fn on_connection_lost(&mut self, now: Instant) {
        self.limiter.reset();
        self.bridge.begin_reconnect();
        if self.supervisor.arm(now) {
            info!(
                "Connection to Stream Deck lost, polling in {:.1}s...",
                self.supervisor.interval().as_secs_f64()
            );
        }
    }

    fn on_reconnect_due(&mut self, now: Instant) {
        if !self.supervisor.begin_attempt(now) {
            return;
        }
        info!("Retrying (attempt {})...", self.bridge.reconnect_attempts() + 1);
        match self.bridge.try_reconnect() {
            Ok((identity, panel)) => {
                self.supervisor.finish(true, now);
                info!(
                    "Reconnected to Stream Deck, Model: {}, S/N: {}",
                    identity.model, identity.serial
                );
                self.compositor.rebuild(panel);
                self.limiter.reset();
                self.resize_surface();
                self.request_full_capture();
            }
            Err(e) => {
                debug!("Stream Deck still unavailable: {}", e);
                self.supervisor.finish(false, now);
            }
        }
    }

    fn resize_surface(&mut self) {
        let panel = self.compositor.panel();
        let (width, height) = surface_size(&panel, self.config.scale_factor());
        if let Err(e) = self.surface.resize(width, height) {
            warn!("Failed to resize surface: {:#}", e);
        }
    }

    fn request_full_capture(&mut self) {
        let rect = self.compositor.panel().full_rect();
        if let Err(e) = self.surface.capture_page(rect) {
            warn!("Full capture request failed: {:#}", e);
        }
    }

    fn on_control(
        &mut self,
        request: ControlRequest,
        reply: oneshot::Sender<ControlReply>,
        now: Instant,
    ) {
        let answer = match request {
            ControlRequest::GetSettings => ControlReply::SetSettings {
                settings: self.settings_snapshot(),
            },
            ControlRequest::SetSettings { settings } => self.apply_settings(settings, now),
            ControlRequest::GetHelp => ControlReply::ReturnHelp {
                help: self.help.clone(),
            },
        };
        if reply.send(answer).is_err() {
            debug!("Control client went away before the reply");
        }
    }

    fn settings_snapshot(&self) -> SettingsSnapshot {
        let device_list = self.bridge.list_devices().unwrap_or_else(|e| {
            warn!("Failed to list devices: {}", e);
            Vec::new()
        });
        SettingsSnapshot {
            url: self.config.general.url.clone(),
            current_url: self.current_url.clone(),
            brightness: self.bridge.brightness(),
            device_serial: self.bridge.identity().map(|i| i.serial.clone()),
            device_list,
        }
    }

    /// Apply the fields that changed, persist them, then `ack`.
    ///
    /// Navigation runs first: a `nak` leaves every setting untouched.
    fn apply_settings(&mut self, patch: SettingsPatch, now: Instant) -> ControlReply {
        let mut changed = false;

        if let Some(url) = patch.current_url.filter(|u| *u != self.current_url) {
            if let Err(e) = self.surface.navigate(&url) {
                warn!("Failed to open {}: {:#}", url, e);
                return ControlReply::Nak {
                    error: format!("navigation failed: {:#}", e),
                };
            }
            self.current_url = url.clone();
            self.config.general.url = url;
            changed = true;
        }

        if let Some(level) = patch.brightness {
            if clamp_brightness(level) != self.bridge.brightness() {
                let applied = self.bridge.set_brightness(level);
                self.config.general.brightness = i32::from(applied);
                changed = true;
                if !self.bridge.is_connected() {
                    self.on_connection_lost(now);
                }
            }
        }

        if changed && self.persist {
            if let Err(e) = self.config.save() {
                warn!("Failed to save settings: {:#}", e);
            }
        }
        ControlReply::Ack
    }
}
