//! Global constants for deckview
//!
//! Consolidates timing, pixel-format and device constants
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Timing Constants
// ============================================================================

/// Delay between reconnect attempts after the deck is lost (milliseconds)
pub const RECONNECT_INTERVAL_MS: u64 = 3000;

/// Default cap on full-panel pushes per second
pub const DEFAULT_MAX_FPS: u32 = 10;

/// Lowest accepted push rate
pub const MIN_FPS: u32 = 1;

/// Highest accepted push rate (the USB link cannot sustain more)
pub const MAX_FPS: u32 = 30;

/// Interval at which key/error reports are drained from the device (milliseconds)
pub const DECK_POLL_INTERVAL_MS: u64 = 10;

// ============================================================================
// Pixel Formats
// ============================================================================

/// Bytes per pixel delivered by the rendering surface (4 channels, alpha last)
pub const STRIDE_SURFACE: usize = 4;

/// Bytes per pixel expected by the deck (RGB, no alpha)
pub const STRIDE_DECK: usize = 3;

// ============================================================================
// Device Settings
// ============================================================================

/// Brightness applied when neither the config nor the command line sets one
pub const DEFAULT_BRIGHTNESS: i32 = 75;

/// Minimum brightness percentage
pub const MIN_BRIGHTNESS: i32 = 0;

/// Maximum brightness percentage
pub const MAX_BRIGHTNESS: i32 = 100;

/// Page loaded when nothing else is configured
pub const DEFAULT_URL: &str = "about:blank";

/// Minimum display scale factor
pub const MIN_DISPLAY_SCALE: f64 = 0.5;

/// Maximum display scale factor
pub const MAX_DISPLAY_SCALE: f64 = 4.0;

// ============================================================================
// Exit Statuses
// ============================================================================

/// The deck requested with `--device` is not attached
pub const EXIT_DEVICE_NOT_FOUND: i32 = 2;

/// No deck is attached at all
pub const EXIT_NO_DEVICES: i32 = 3;

// ============================================================================
// Helper Functions
// ============================================================================

/// Clamp a requested brightness into the 0-100 range the hardware accepts
#[inline]
pub const fn clamp_brightness(level: i32) -> u8 {
    if level < MIN_BRIGHTNESS {
        MIN_BRIGHTNESS as u8
    } else if level > MAX_BRIGHTNESS {
        MAX_BRIGHTNESS as u8
    } else {
        level as u8
    }
}

/// Clamp a push rate into the supported range
#[inline]
pub const fn clamp_fps(fps: u32) -> u32 {
    if fps < MIN_FPS {
        MIN_FPS
    } else if fps > MAX_FPS {
        MAX_FPS
    } else {
        fps
    }
}

/// Clamp a display scale factor; non-finite values fall back to 1.0
#[inline]
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(MIN_DISPLAY_SCALE, MAX_DISPLAY_SCALE)
    } else {
        1.0
    }
}
