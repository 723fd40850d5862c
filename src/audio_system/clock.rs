/// Time sources
///
/// Handles measure delays with the unscaled frame delta handed to each tick,
/// while fades run on wall-clock time read from a [`Clock`].
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time since some fixed origin
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Real time since construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced explicitly by the host
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// Timing of one engine tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Real time since the previous tick, unaffected by time scale
    pub delta: Duration,
    /// Host time scale, used only by handles that sync pitch with it
    pub time_scale: f32,
}

impl Frame {
    pub fn new(delta: Duration) -> Self {
        Self {
            delta,
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f32) -> Self {
        self.time_scale = time_scale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        let shared = clock.clone();
        shared.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));

        clock.set(Duration::from_secs(3));
        assert_eq!(shared.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_frame_time_scale() {
        let frame = Frame::new(Duration::from_millis(16)).with_time_scale(0.5);
        assert_eq!(frame.delta, Duration::from_millis(16));
        assert_eq!(frame.time_scale, 0.5);
    }
}
