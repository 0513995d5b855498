//! Push cadence limiting
//!
//! The deck's USB link only sustains a handful of full-panel writes per
//! second. Tiles are always composited immediately; the limiter only
//! decides when the composited frame goes out. A push refused by the
//! limiter stays pending until the next slot, so the frame that is
//! eventually sent includes every tile applied in between.

use std::time::{Duration, Instant};

use crate::constants::clamp_fps;

/// Rate limiter for full-panel pushes
#[derive(Debug)]
pub struct FrameLimiter {
    min_interval: Duration,
    last_push: Option<Instant>,
    pending: bool,
}

impl FrameLimiter {
    pub fn new(max_fps: u32) -> Self {
        Self {
            min_interval: Duration::from_secs(1) / clamp_fps(max_fps),
            last_push: None,
            pending: false,
        }
    }

    #[cfg(test)]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// A push was requested. Returns true if it may go out now.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.slot_open(now) {
            self.last_push = Some(now);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Called when the pending deadline fires. Returns true if the
    /// deferred push should go out now.
    pub fn flush(&mut self, now: Instant) -> bool {
        self.pending && self.request(now)
    }

    /// When the pending push may go out, if one is waiting
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        Some(match self.last_push {
            Some(last) => last + self.min_interval,
            None => Instant::now(),
        })
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Forget timing state (e.g. after a reconnect, push the first frame at once)
    pub fn reset(&mut self) {
        self.last_push = None;
        self.pending = false;
    }

    fn slot_open(&self, now: Instant) -> bool {
        match self.last_push {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_push_is_immediate() {
        let mut limiter = FrameLimiter::new(10);
        assert!(limiter.request(Instant::now()));
        assert!(!limiter.is_pending());
    }

    #[test]
    fn test_burst_is_coalesced() {
        let mut limiter = FrameLimiter::new(10);
        let t0 = Instant::now();
        assert!(limiter.request(t0));
        assert!(!limiter.request(t0 + Duration::from_millis(10)));
        assert!(!limiter.request(t0 + Duration::from_millis(20)));
        assert_eq!(limiter.next_deadline(), Some(t0 + Duration::from_millis(100)));

        assert!(!limiter.flush(t0 + Duration::from_millis(50)));
        assert!(limiter.flush(t0 + Duration::from_millis(100)));
        assert!(!limiter.is_pending());
        assert_eq!(limiter.next_deadline(), None);
    }

    #[test]
    fn test_flush_without_pending_is_noop() {
        let mut limiter = FrameLimiter::new(4);
        let t0 = Instant::now();
        limiter.request(t0);
        assert!(!limiter.flush(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(FrameLimiter::new(0).min_interval(), Duration::from_secs(1));
        assert_eq!(FrameLimiter::new(1000).min_interval(), Duration::from_secs(1) / 30);
    }

    #[test]
    fn test_reset_allows_immediate_push() {
        let mut limiter = FrameLimiter::new(1);
        let t0 = Instant::now();
        limiter.request(t0);
        limiter.reset();
        assert!(limiter.request(t0 + Duration::from_millis(1)));
    }
}
