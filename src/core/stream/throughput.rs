use std::time::{Duration, Instant};

/// Counts bytes and reports a rate once per interval
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    interval: Duration,
    window_start: Instant,
    window_bytes: u64,
    total_bytes: u64,
}

impl ThroughputMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            window_bytes: 0,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.window_bytes += bytes as u64;
        self.total_bytes += bytes as u64;
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes per second over the elapsed window, once the interval has passed
    ///
    /// Returns `None` before the interval ends and for windows without data;
    /// either way a finished window is restarted at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let bytes = std::mem::take(&mut self.window_bytes);
        self.window_start = now;
        if bytes == 0 || elapsed.is_zero() {
            return None;
        }
        Some(bytes as f64 / elapsed.as_secs_f64())
    }
}
