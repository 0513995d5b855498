//! Linux hidraw backend for Stream Deck devices
//!
//! Devices are found through udev (hidraw nodes whose USB parent carries
//! the Elgato vendor id) and opened non-blocking.
//! - Key images: 1024-byte output reports carrying JPEG pages
//! - Brightness/reset/serial: 32-byte feature reports via ioctl
//! - Key states: input report 0x01, one byte per key from offset 4

use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use image::codecs::jpeg::JpegEncoder;

use super::driver::{DeckDriver, DeckEvent, DeckHandle, DeviceInfo, KeyStateTracker};
use super::error::DeckError;
use super::models::{find_model, DeckModel, KeyFlip, ELGATO_VENDOR_ID};
use crate::constants::STRIDE_DECK;
use crate::frame::Panel;

const IMAGE_REPORT_LENGTH: usize = 1024;
const IMAGE_REPORT_HEADER_LENGTH: usize = 8;
const IMAGE_REPORT_PAYLOAD_LENGTH: usize = IMAGE_REPORT_LENGTH - IMAGE_REPORT_HEADER_LENGTH;
const FEATURE_REPORT_LENGTH: usize = 32;
const INPUT_REPORT_LENGTH: usize = 512;
const KEY_STATE_OFFSET: usize = 4;
const JPEG_QUALITY: u8 = 95;

// Report ids / commands
const REPORT_INPUT: u8 = 0x01;
const REPORT_IMAGE: u8 = 0x02;
const REPORT_SETTINGS: u8 = 0x03;
const REPORT_SERIAL: u8 = 0x06;
const CMD_IMAGE: u8 = 0x07;
const CMD_RESET: u8 = 0x02;
const CMD_BRIGHTNESS: u8 = 0x08;

nix::ioctl_readwrite_buf!(
    /// HIDIOCSFEATURE
    hid_set_feature,
    b'H',
    0x06,
    u8
);
nix::ioctl_readwrite_buf!(
    /// HIDIOCGFEATURE
    hid_get_feature,
    b'H',
    0x07,
    u8
);

/// udev-backed device discovery
#[derive(Debug, Default)]
pub struct HidrawDriver;

impl HidrawDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DeckDriver for HidrawDriver {
    type Handle = HidrawDeck;

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeckError> {
        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_subsystem("hidraw")?;

        let mut devices = Vec::new();
        for device in enumerator.scan_devices()? {
            let Some(node) = device.devnode() else {
                continue;
            };
            let Some(usb) = device.parent_with_subsystem_devtype("usb", "usb_device")? else {
                continue;
            };
            if usb_id(&usb, "idVendor") != Some(ELGATO_VENDOR_ID) {
                continue;
            }
            let Some(product_id) = usb_id(&usb, "idProduct") else {
                continue;
            };
            let Some(model) = find_model(product_id) else {
                debug!(
                    "Skipping unsupported Stream Deck {:#06x} at {}",
                    product_id,
                    node.display()
                );
                continue;
            };
            let serial = usb
                .attribute_value("serial")
                .map(|s| s.to_string_lossy().trim().to_string())
                .unwrap_or_default();

            devices.push(DeviceInfo {
                serial,
                path: node.to_string_lossy().into_owned(),
                model: model.name.to_string(),
                product_id,
            });
        }

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(devices)
    }

    fn open(&self, info: &DeviceInfo) -> Result<HidrawDeck, DeckError> {
        let model =
            find_model(info.product_id).ok_or(DeckError::UnsupportedModel(info.product_id))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&info.path)?;

        info!("Opened {} at {}", model.name, info.path);
        Ok(HidrawDeck {
            file,
            model,
            keys: KeyStateTracker::new(model.key_count()),
            key_rgb: Vec::new(),
        })
    }
}

/// Parse a hex USB id attribute ("0fd9")
fn usb_id(device: &udev::Device, attribute: &str) -> Option<u16> {
    let value = device.attribute_value(attribute)?;
    u16::from_str_radix(value.to_str()?.trim(), 16).ok()
}

/// An open Stream Deck
pub struct HidrawDeck {
    file: File,
    model: &'static DeckModel,
    keys: KeyStateTracker,
    /// Scratch buffer for one key's RGB pixels
    key_rgb: Vec<u8>,
}

impl HidrawDeck {
    fn send_feature(&self, payload: &[u8]) -> Result<(), DeckError> {
        let mut report = [0u8; FEATURE_REPORT_LENGTH];
        report[..payload.len()].copy_from_slice(payload);
        unsafe { hid_set_feature(self.file.as_raw_fd(), &mut report) }
            .map_err(std::io::Error::from)?;
        Ok(())
    }

    fn read_feature(&self, report_id: u8) -> Result<[u8; FEATURE_REPORT_LENGTH], DeckError> {
        let mut report = [0u8; FEATURE_REPORT_LENGTH];
        report[0] = report_id;
        unsafe { hid_get_feature(self.file.as_raw_fd(), &mut report) }
            .map_err(std::io::Error::from)?;
        Ok(report)
    }

    fn write_keys(
        &mut self,
        rgb: &[u8],
        panel: Panel,
        key_rgb: &mut Vec<u8>,
    ) -> Result<(), DeckError> {
        for key in 0..panel.key_count() {
            extract_key(rgb, panel, key, self.model.flip, key_rgb);
            let jpeg = encode_jpeg(key_rgb, panel.cell_size)?;
            self.write_key_image(key as u8, &jpeg)?;
        }
        Ok(())
    }

    fn write_key_image(&mut self, key: u8, jpeg: &[u8]) -> Result<(), DeckError> {
        for report in image_reports(key, jpeg) {
            self.file.write_all(&report)?;
        }
        Ok(())
    }
}

impl DeckHandle for HidrawDeck {
    fn model(&self) -> &str {
        self.model.name
    }

    fn panel(&self) -> Panel {
        self.model.panel()
    }

    fn serial_number(&mut self) -> Result<String, DeckError> {
        let report = self.read_feature(REPORT_SERIAL)?;
        Ok(extract_string(&report[2..]))
    }

    fn clear_all_keys(&mut self) -> Result<(), DeckError> {
        let size = self.model.key_size;
        let black = vec![0u8; (size * size) as usize * STRIDE_DECK];
        let jpeg = encode_jpeg(&black, size)?;
        for key in 0..self.model.key_count() {
            self.write_key_image(key as u8, &jpeg)?;
        }
        Ok(())
    }

    fn fill_panel(&mut self, rgb: &[u8]) -> Result<(), DeckError> {
        let panel = self.model.panel();
        if rgb.len() != panel.frame_len() {
            return Err(DeckError::FrameSize {
                expected: panel.frame_len(),
                actual: rgb.len(),
            });
        }

        let mut key_rgb = std::mem::take(&mut self.key_rgb);
        let result = self.write_keys(rgb, panel, &mut key_rgb);
        self.key_rgb = key_rgb;
        result
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeckError> {
        self.send_feature(&[REPORT_SETTINGS, CMD_BRIGHTNESS, percent.min(100)])
    }

    fn reset_to_logo(&mut self) -> Result<(), DeckError> {
        self.send_feature(&[REPORT_SETTINGS, CMD_RESET])
    }

    fn poll_events(&mut self) -> Vec<DeckEvent> {
        let mut events = Vec::new();
        let mut buf = [0u8; INPUT_REPORT_LENGTH];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => {
                    events.push(DeckEvent::Error(DeckError::Connectivity(
                        "could not read from HID device (end of stream)".into(),
                    )));
                    break;
                }
                Ok(n) => {
                    if let Some(states) = key_states(&buf[..n], self.model.key_count()) {
                        events.extend(self.keys.update(states).into_iter().map(DeckEvent::Key));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    events.push(DeckEvent::Error(DeckError::Io(e)));
                    break;
                }
            }
        }
        events
    }
}

/// Key state bytes of an input report, if it is a key report
fn key_states(report: &[u8], key_count: usize) -> Option<&[u8]> {
    if report.first() != Some(&REPORT_INPUT) || report.get(1) != Some(&0x00) {
        return None;
    }
    report.get(KEY_STATE_OFFSET..KEY_STATE_OFFSET + key_count)
}

/// Split an encoded key image into output reports.
///
/// Header: report id, command, key, last-page flag, payload length (LE16),
/// page number (LE16). Unused payload bytes are zero.
fn image_reports(key: u8, data: &[u8]) -> Vec<[u8; IMAGE_REPORT_LENGTH]> {
    let pages = data.chunks(IMAGE_REPORT_PAYLOAD_LENGTH);
    let total = pages.len();
    let mut reports = Vec::with_capacity(total);

    for (page, chunk) in pages.enumerate() {
        let mut report = [0u8; IMAGE_REPORT_LENGTH];
        let length = (chunk.len() as u16).to_le_bytes();
        let page_number = (page as u16).to_le_bytes();
        report[..IMAGE_REPORT_HEADER_LENGTH].copy_from_slice(&[
            REPORT_IMAGE,
            CMD_IMAGE,
            key,
            u8::from(page + 1 == total),
            length[0],
            length[1],
            page_number[0],
            page_number[1],
        ]);
        report[IMAGE_REPORT_HEADER_LENGTH..IMAGE_REPORT_HEADER_LENGTH + chunk.len()]
            .copy_from_slice(chunk);
        reports.push(report);
    }
    reports
}

/// Copy one key's pixels out of the panel frame, applying the model's flip.
///
/// `frame` must be exactly `panel.frame_len()` bytes.
fn extract_key(frame: &[u8], panel: Panel, key: u32, flip: KeyFlip, out: &mut Vec<u8>) {
    let size = panel.cell_size as usize;
    let width = panel.width() as usize;
    let col = (key % panel.columns) as usize;
    let row = (key / panel.columns) as usize;
    let line_bytes = size * STRIDE_DECK;

    out.clear();
    out.reserve(size * line_bytes);
    for y in 0..size {
        let src_y = match flip {
            KeyFlip::None => y,
            KeyFlip::Both => size - 1 - y,
        };
        let start = ((row * size + src_y) * width + col * size) * STRIDE_DECK;
        let line = &frame[start..start + line_bytes];
        match flip {
            KeyFlip::None => out.extend_from_slice(line),
            KeyFlip::Both => {
                for px in line.chunks_exact(STRIDE_DECK).rev() {
                    out.extend_from_slice(px);
                }
            }
        }
    }
}

fn encode_jpeg(rgb: &[u8], size: u32) -> Result<Vec<u8>, DeckError> {
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder.encode(rgb, size, size, image::ColorType::Rgb8)?;
    Ok(jpeg)
}

/// NUL-terminated ASCII string from a feature report
fn extract_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_reports_paging() {
        let data: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
        let reports = image_reports(7, &data);
        assert_eq!(reports.len(), 2);

        let first = &reports[0];
        assert_eq!(&first[..8], &[0x02, 0x07, 7, 0, 0xf8, 0x03, 0, 0]);
        assert_eq!(&first[8..], &data[..1016]);

        let second = &reports[1];
        let rest = 2000 - 1016;
        assert_eq!(&second[..8], &[0x02, 0x07, 7, 1, rest as u8, (rest >> 8) as u8, 1, 0]);
        assert_eq!(&second[8..8 + rest], &data[1016..]);
        assert!(second[8 + rest..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_image_reports_single_page() {
        let reports = image_reports(0, &[1, 2, 3]);
        assert_eq!(reports.len(), 1);
        assert_eq!(&reports[0][..11], &[0x02, 0x07, 0, 1, 3, 0, 0, 0, 1, 2, 3]);
    }

    fn numbered_frame(panel: Panel) -> Vec<u8> {
        // Each pixel's red byte is its x, green its y
        let mut frame = vec![0u8; panel.frame_len()];
        for y in 0..panel.height() {
            for x in 0..panel.width() {
                let i = ((y * panel.width() + x) * 3) as usize;
                frame[i] = x as u8;
                frame[i + 1] = y as u8;
            }
        }
        frame
    }

    #[test]
    fn test_extract_key_no_flip() {
        let panel = Panel::new(2, 3, 4);
        let frame = numbered_frame(panel);
        let mut out = Vec::new();
        // key 4 = row 1, col 1 → origin (4, 4)
        extract_key(&frame, panel, 4, KeyFlip::None, &mut out);
        assert_eq!(out.len(), 4 * 4 * 3);
        assert_eq!(&out[..3], &[4, 4, 0]);
        assert_eq!(&out[out.len() - 3..], &[7, 7, 0]);
    }

    #[test]
    fn test_extract_key_flip_both() {
        let panel = Panel::new(2, 3, 4);
        let frame = numbered_frame(panel);
        let mut out = Vec::new();
        extract_key(&frame, panel, 0, KeyFlip::Both, &mut out);
        // First output pixel is the key's bottom-right source pixel
        assert_eq!(&out[..3], &[3, 3, 0]);
        assert_eq!(&out[out.len() - 3..], &[0, 0, 0]);
    }

    #[test]
    fn test_key_states() {
        let mut report = vec![0x01, 0x00, 0x0f, 0x00];
        report.extend_from_slice(&[0, 1, 0]);
        assert_eq!(key_states(&report, 3), Some(&[0, 1, 0][..]));
        // Dial/touch reports on the + use a different sub-type
        report[1] = 0x03;
        assert_eq!(key_states(&report, 3), None);
        assert_eq!(key_states(&[0x01, 0x00, 0x0f], 3), None);
    }

    #[test]
    fn test_extract_string() {
        assert_eq!(extract_string(b"AL12K1A00000\0\0\0"), "AL12K1A00000");
        assert_eq!(extract_string(b"ABC"), "ABC");
    }

    #[test]
    fn test_encode_jpeg_header() {
        let jpeg = encode_jpeg(&vec![0u8; 72 * 72 * 3], 72).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }
}
