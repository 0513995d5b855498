//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/deckview/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    clamp_fps, clamp_scale, DEFAULT_BRIGHTNESS, DEFAULT_MAX_FPS, DEFAULT_URL,
    RECONNECT_INTERVAL_MS,
};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub pipeline: PipelineConfig,
    pub surface: SurfaceConfig,
    pub control: ControlConfig,
}

/// What to show and on which deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Start URL
    pub url: String,
    /// Key brightness in percent (clamped to 0-100)
    pub brightness: i32,
    /// Connect to this serial number only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    /// Panel pixels per logical surface pixel (0.5-4.0)
    pub scale_factor: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            brightness: DEFAULT_BRIGHTNESS,
            device_serial: None,
            scale_factor: 1.0,
        }
    }
}

/// Frame pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on full-panel pushes per second (1-30)
    pub max_fps: u32,
    /// Delay between reconnect attempts
    pub reconnect_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_fps: DEFAULT_MAX_FPS,
            reconnect_interval_ms: RECONNECT_INTERVAL_MS,
        }
    }
}

/// Snapshot surface wiring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Image file the renderer keeps up to date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<PathBuf>,
    /// Pointer events are appended here as JSON lines (stdout if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sink: Option<PathBuf>,
    /// Navigation requests are written here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: None,
        }
    }
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/deckview/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. DECKVIEW_CONFIG environment variable
        if let Ok(path) = std::env::var("DECKVIEW_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/deckview/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/deckview/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. DECKVIEW_CONFIG environment variable
    /// 2. ~/.config/deckview/config.toml (user config)
    /// 3. /etc/deckview/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Persist the settings the control channel can change (url,
    /// brightness) into the user config, keeping everything else in it.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()
            .filter(|p| p != Path::new(Self::SYSTEM_CONFIG_PATH))
            .or_else(default_config_path)
            .context("Config directory not found")?;

        let mut stored = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        stored.general.url = self.general.url.clone();
        stored.general.brightness = self.general.brightness;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(&stored)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        info!("Saved settings to {}", path.display());
        Ok(path)
    }

    pub fn scale_factor(&self) -> f64 {
        clamp_scale(self.general.scale_factor)
    }

    pub fn max_fps(&self) -> u32 {
        clamp_fps(self.pipeline.max_fps)
    }

    /// Reconnect interval (at least 100ms)
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.pipeline.reconnect_interval_ms.max(100))
    }

    /// Write the commented template to `path` (default: user config path)
    pub fn write_template(path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path().context("Config directory not found")?,
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        std::fs::write(&path, template())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deckview").join("config.toml"))
}

fn template() -> String {
    format!(
        r#"# deckview configuration
#
# Command-line flags override these values.

[general]
# Page shown at startup (also updated by the control channel)
url = "{url}"

# Key brightness in percent (0-100)
brightness = {brightness}

# Only connect to this deck (see `deckview --list-devices`)
# device_serial = "AL12K1A00000"

# Panel pixels per logical surface pixel (zoom). The renderer's viewport
# and pointer coordinates are the panel size divided by this; the image
# it writes stays at full panel resolution. 2.0 shows a 180x108 page on
# a 360x216 panel.
scale_factor = 1.0

[pipeline]
# Full-panel pushes per second (1-30). The USB link handles about 10.
max_fps = {max_fps}

# Delay between reconnect attempts after the deck is unplugged
reconnect_interval_ms = {reconnect}

[surface]
# Image the renderer writes (PNG or JPEG, replaced atomically)
# frame_path = "/run/deckview/frame.png"

# Pointer events as JSON lines (stdout if unset)
# input_sink = "/run/deckview/input.jsonl"

# Navigation requests are written here for the renderer
# url_file = "/run/deckview/url"

[control]
enabled = true

# Default: $XDG_RUNTIME_DIR/deckview/control.sock
# socket_path = "/run/deckview/control.sock"
"#,
        url = DEFAULT_URL,
        brightness = DEFAULT_BRIGHTNESS,
        max_fps = DEFAULT_MAX_FPS,
        reconnect = RECONNECT_INTERVAL_MS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::clamp_brightness;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.url, DEFAULT_URL);
        assert_eq!(clamp_brightness(config.general.brightness), 75);
        assert_eq!(config.max_fps(), 10);
        assert_eq!(config.reconnect_interval(), Duration::from_millis(3000));
        assert!(config.control.enabled);
        assert!(config.surface.frame_path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
[general]
url = "https://example.com"
device_serial = "AL12K1A00000"

[surface]
frame_path = "/tmp/frame.png"
"#,
        )
        .unwrap();
        assert_eq!(config.general.url, "https://example.com");
        assert_eq!(config.general.device_serial.as_deref(), Some("AL12K1A00000"));
        assert_eq!(config.general.brightness, DEFAULT_BRIGHTNESS);
        assert_eq!(config.surface.frame_path, Some(PathBuf::from("/tmp/frame.png")));
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_values_are_clamped() {
        let config = Config::parse(
            r#"
[general]
brightness = 250
scale_factor = 9.0

[pipeline]
max_fps = 0
reconnect_interval_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(clamp_brightness(config.general.brightness), 100);
        assert_eq!(config.scale_factor(), 4.0);
        assert_eq!(config.max_fps(), 1);
        assert_eq!(config.reconnect_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("[general\nurl =").is_err());
        assert!(Config::parse("[general]\nbrightness = \"high\"").is_err());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config = Config::parse(&template()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_serialized_config_round_trips() {
        let mut config = Config::default();
        config.general.url = "https://example.com/dash".into();
        config.surface.url_file = Some(PathBuf::from("/run/deckview/url"));
        let content = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&content).unwrap(), config);
    }
}
