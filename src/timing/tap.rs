// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tap tempo.
//!
//! Averages the intervals between recent taps into a BPM value.

use std::time::{Duration, Instant};

/// Lowest tempo tap detection reports
pub const MIN_TAP_BPM: f64 = 20.0;

/// Highest tempo tap detection reports
pub const MAX_TAP_BPM: f64 = 300.0;

/// Tap tempo calculator
#[derive(Debug, Clone)]
pub struct TapTempo {
    /// Recent tap times
    taps: Vec<Instant>,
    /// Maximum number of taps to average
    max_taps: usize,
    /// Maximum time between taps before resetting
    timeout: Duration,
}

impl TapTempo {
    /// Create a new tap tempo calculator
    pub fn new(max_taps: usize, timeout_ms: u64) -> Self {
        Self {
            taps: Vec::with_capacity(max_taps.max(2)),
            max_taps: max_taps.max(2),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Record a tap and return the calculated BPM if enough taps
    pub fn tap(&mut self) -> Option<f64> {
        self.tap_at(Instant::now())
    }

    /// Record a tap at a given instant
    pub fn tap_at(&mut self, now: Instant) -> Option<f64> {
        // A long pause starts a new measurement
        if let Some(last) = self.taps.last() {
            if now.saturating_duration_since(*last) > self.timeout {
                self.taps.clear();
            }
        }

        self.taps.push(now);
        if self.taps.len() > self.max_taps {
            self.taps.remove(0);
        }

        if self.taps.len() < 2 {
            return None;
        }

        let intervals: Vec<Duration> = self
            .taps
            .windows(2)
            .map(|w| w[1].saturating_duration_since(w[0]))
            .collect();

        let avg_interval: Duration = intervals.iter().sum::<Duration>() / intervals.len() as u32;
        if avg_interval.is_zero() {
            return None;
        }
        let bpm = 60.0 / avg_interval.as_secs_f64();

        Some(bpm.clamp(MIN_TAP_BPM, MAX_TAP_BPM))
    }

    /// Number of taps in the current measurement
    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Reset the tap tempo
    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(4, 2000) // Average 4 taps, 2 second timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_tap_tempo() {
        let mut tap = TapTempo::new(4, 2000);

        // First tap - no BPM yet
        assert!(tap.tap().is_none());

        // Second tap after ~500ms = 120 BPM
        thread::sleep(Duration::from_millis(500));
        let bpm = tap.tap().unwrap();
        // Allow for timing variance
        assert!(bpm > 100.0 && bpm < 140.0);
    }

    #[test]
    fn test_tap_average() {
        let mut tap = TapTempo::new(4, 2000);
        let start = Instant::now();

        tap.tap_at(start);
        tap.tap_at(start + Duration::from_millis(400));
        tap.tap_at(start + Duration::from_millis(1000));
        let bpm = tap.tap_at(start + Duration::from_millis(1500)).unwrap();

        // Average interval 500ms
        assert!((bpm - 120.0).abs() < 1e-6);
        assert_eq!(tap.tap_count(), 4);
    }

    #[test]
    fn test_tap_timeout_resets() {
        let mut tap = TapTempo::new(4, 1000);
        let start = Instant::now();

        tap.tap_at(start);
        assert!(tap.tap_at(start + Duration::from_millis(500)).is_some());
        assert!(tap.tap_at(start + Duration::from_millis(3000)).is_none());
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn test_tap_clamps() {
        let mut tap = TapTempo::new(4, 5000);
        let start = Instant::now();

        tap.tap_at(start);
        let bpm = tap.tap_at(start + Duration::from_millis(50)).unwrap();
        assert_eq!(bpm, MAX_TAP_BPM);

        tap.reset();
        assert_eq!(tap.tap_count(), 0);
    }
}
