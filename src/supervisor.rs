//! Reconnect timer
//!
//! Pure state with the clock passed in. The control loop sleeps until
//! [`ReconnectSupervisor::deadline`] and then calls `begin_attempt`, so at
//! most one attempt is ever in flight and a new timer is only armed after
//! the previous attempt has finished.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Armed { deadline: Instant },
    Attempting,
}

#[derive(Debug)]
pub struct ReconnectSupervisor {
    interval: Duration,
    state: RetryState,
}

impl ReconnectSupervisor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: RetryState::Idle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[cfg(test)]
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Schedule the first retry. No-op while a timer is armed or an
    /// attempt is running.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.state != RetryState::Idle {
            return false;
        }
        self.state = RetryState::Armed {
            deadline: now + self.interval,
        };
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            RetryState::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// The timer fired. Returns true if an attempt should run now.
    pub fn begin_attempt(&mut self, now: Instant) -> bool {
        match self.state {
            RetryState::Armed { deadline } if now >= deadline => {
                self.state = RetryState::Attempting;
                true
            }
            _ => false,
        }
    }

    /// The attempt concluded. A failure re-arms after the same interval.
    pub fn finish(&mut self, connected: bool, now: Instant) {
        if self.state != RetryState::Attempting {
            return;
        }
        self.state = if connected {
            RetryState::Idle
        } else {
            RetryState::Armed {
                deadline: now + self.interval,
            }
        };
    }

    /// Drop any pending retry (shutdown)
    pub fn cancel(&mut self) {
        self.state = RetryState::Idle;
    }
}
