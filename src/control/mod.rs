//! Control channel messages
//!
//! Requests and replies are JSON objects tagged by `type`:
//!
//! | request        | reply                                   |
//! |----------------|-----------------------------------------|
//! | `get_settings` | `set_settings { settings }`             |
//! | `set_settings` | `ack` (or `nak` if navigation failed)   |
//! | `get_help`     | `return_help { help }`                  |
//! | anything else  | `nak { error }`                         |

pub mod socket;

use serde::{Deserialize, Serialize};

use crate::deck::DeviceInfo;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    GetSettings,
    SetSettings {
        #[serde(default)]
        settings: SettingsPatch,
    },
    GetHelp,
}

/// Fields a client may change; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub current_url: Option<String>,
    pub brightness: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    SetSettings { settings: SettingsSnapshot },
    Ack,
    ReturnHelp { help: String },
    Nak { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    /// Start URL
    pub url: String,
    /// URL the surface is showing now
    pub current_url: String,
    pub brightness: u8,
    pub device_serial: Option<String>,
    pub device_list: Vec<DeviceInfo>,
}

pub fn parse_request(line: &str) -> Result<ControlRequest, serde_json::Error> {
    serde_json::from_str(line)
}

/// One reply line (newline-terminated)
pub fn encode_reply(reply: &ControlReply) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(reply)?;
    line.push('\n');
    Ok(line)
}

pub use socket::{ControlCommand, ControlServer};
